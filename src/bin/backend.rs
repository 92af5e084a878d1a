#![forbid(unsafe_code)]

//! API server: session gate in front of the content endpoints.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use dramafeed::{
    api::{self, AppState},
    catalog::SqliteSnapshotStore,
    config::{DEFAULT_CONFIG_PATH, load_runtime_config_from},
    content::ContentOrchestrator,
    logging::init_tracing,
    security::{HttpIdentityVerifier, ensure_not_root},
    upstream::HttpContentSource,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the dramafeed content API.")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env config file")]
    config: PathBuf,
    #[arg(long = "host", value_name = "ADDR", help = "Override the listen address")]
    host: Option<IpAddr>,
    #[arg(long = "port", value_name = "PORT", help = "Override the listen port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    ensure_not_root("backend")?;

    let config = load_runtime_config_from(&cli.config)?;
    let host = match cli.host {
        Some(host) => host,
        None => config
            .host
            .parse()
            .with_context(|| format!("parsing listen host {}", config.host))?,
    };
    let port = cli.port.unwrap_or(config.port);

    let snapshots = SqliteSnapshotStore::open(&config.snapshot_db).with_context(|| {
        format!(
            "opening snapshot store {}",
            config.snapshot_db.display()
        )
    })?;
    let content = ContentOrchestrator::new(
        Arc::new(HttpContentSource::new(
            &config.upstream_url,
            config.upstream_deadline,
        )),
        Arc::new(snapshots),
    )
    .with_deadline(config.upstream_deadline)
    .with_search_ttl(config.search_cache_ttl);

    let state = AppState {
        content: Arc::new(content),
        verifier: Arc::new(HttpIdentityVerifier::new(&config.identity_url)),
        cookie_secure: config.cookie_secure,
    };
    let app = api::router(state);

    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        %addr,
        upstream = %config.upstream_url,
        deadline_ms = config.upstream_deadline.as_millis() as u64,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_are_optional() {
        let cli = Cli::try_parse_from(["backend"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn cli_parses_host_and_port() {
        let cli = Cli::try_parse_from(["backend", "--host", "0.0.0.0", "--port", "9090"]).unwrap();
        assert_eq!(cli.host, Some("0.0.0.0".parse::<IpAddr>().unwrap()));
        assert_eq!(cli.port, Some(9090));
    }
}
