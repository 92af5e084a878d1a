#![forbid(unsafe_code)]

//! Refreshes the fallback snapshot from the upstream. Meant to run from a
//! timer, like a nightly cron job but more often.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use dramafeed::{
    catalog::SqliteSnapshotStore,
    config::{DEFAULT_CONFIG_PATH, load_runtime_config_from},
    logging::init_tracing,
    security::ensure_not_root,
    sync::refresh_snapshot,
    upstream::HttpContentSource,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Write a fresh fallback snapshot.")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env config file")]
    config: PathBuf,
    #[arg(long = "snapshot-db", value_name = "PATH", help = "Override the snapshot database path")]
    snapshot_db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    ensure_not_root("snapshot_sync")?;

    let config = load_runtime_config_from(&cli.config)?;
    let db_path = cli.snapshot_db.unwrap_or(config.snapshot_db);
    let store = SqliteSnapshotStore::open(&db_path)
        .with_context(|| format!("opening snapshot store {}", db_path.display()))?;
    let source = Arc::new(HttpContentSource::new(
        &config.upstream_url,
        config.upstream_deadline,
    ));

    info!(upstream = %config.upstream_url, db = %db_path.display(), "refreshing snapshot");
    let report = refresh_snapshot(source, &store, config.upstream_deadline).await?;
    info!(
        trending = report.trending,
        latest = report.latest,
        "snapshot sync finished"
    );
    Ok(())
}
