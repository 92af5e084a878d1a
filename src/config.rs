use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{cache::SEARCH_CACHE_TTL, upstream::DEFAULT_DEADLINE};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dramafeed-env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SNAPSHOT_DB: &str = "/var/lib/dramafeed/snapshot.db";

const KEYS: &[&str] = &[
    "DRAMAFEED_HOST",
    "DRAMAFEED_PORT",
    "SNAPSHOT_DB",
    "UPSTREAM_URL",
    "IDENTITY_URL",
    "UPSTREAM_DEADLINE_MS",
    "SEARCH_CACHE_TTL_SECS",
    "COOKIE_SECURE",
];

/// Values as found in the env file and process environment, before defaults.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub snapshot_db: Option<PathBuf>,
    pub upstream_url: Option<String>,
    pub identity_url: Option<String>,
    pub upstream_deadline_ms: Option<u64>,
    pub search_cache_ttl_secs: Option<u64>,
    pub cookie_secure: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub snapshot_db: PathBuf,
    pub upstream_url: String,
    pub identity_url: String,
    pub upstream_deadline: Duration,
    pub search_cache_ttl: Duration,
    pub cookie_secure: bool,
}

impl EnvConfig {
    /// Applies one `KEY=value` pair. Unknown keys are ignored and empty values
    /// leave the setting untouched.
    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        match key {
            "DRAMAFEED_HOST" => self.host = Some(value.to_string()),
            "DRAMAFEED_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing DRAMAFEED_PORT from {origin}"))?;
                self.port = Some(port);
            }
            "SNAPSHOT_DB" => self.snapshot_db = Some(PathBuf::from(value)),
            "UPSTREAM_URL" => self.upstream_url = Some(value.to_string()),
            "IDENTITY_URL" => self.identity_url = Some(value.to_string()),
            "UPSTREAM_DEADLINE_MS" => {
                let millis: u64 = value
                    .parse()
                    .with_context(|| format!("Parsing UPSTREAM_DEADLINE_MS from {origin}"))?;
                self.upstream_deadline_ms = Some(millis);
            }
            "SEARCH_CACHE_TTL_SECS" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Parsing SEARCH_CACHE_TTL_SECS from {origin}"))?;
                self.search_cache_ttl_secs = Some(secs);
            }
            "COOKIE_SECURE" => {
                self.cookie_secure = Some(matches!(
                    value.to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                ))
            }
            _ => {}
        }
        Ok(())
    }

    /// Overrides file values with whatever `lookup` returns for each key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for &key in KEYS {
            if let Some(value) = lookup(key) {
                self.apply(key, value.trim(), "environment")?;
            }
        }
        Ok(())
    }

    pub fn resolve(self) -> Result<RuntimeConfig> {
        let upstream_url = self
            .upstream_url
            .ok_or_else(|| anyhow!("UPSTREAM_URL is not set"))?;
        let identity_url = self
            .identity_url
            .ok_or_else(|| anyhow!("IDENTITY_URL is not set"))?;
        Ok(RuntimeConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            snapshot_db: self
                .snapshot_db
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DB)),
            upstream_url,
            identity_url,
            upstream_deadline: self
                .upstream_deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DEADLINE),
            search_cache_ttl: self
                .search_cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(SEARCH_CACHE_TTL),
            cookie_secure: self.cookie_secure.unwrap_or(false),
        })
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            cfg.apply(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Loads the env file at `path` (if it exists) and layers the process
/// environment on top.
pub fn load_runtime_config_from(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    cfg.resolve()
        .with_context(|| format!("Resolving configuration from {}", path.display()))
}
