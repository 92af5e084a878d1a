//! Out-of-band snapshot refresh.
//!
//! The API never writes the snapshot itself; this job does, on a timer. It
//! only overwrites the stored document when both lists came back from the
//! upstream, so a bad run never replaces a good fallback with a partial one.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use tokio::time::Instant;
use tracing::info;

use crate::{
    catalog::{SNAPSHOT_KEY, SnapshotDocument, SnapshotStore},
    upstream::{ContentSource, fetch_before},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub trending: usize,
    pub latest: usize,
}

pub async fn refresh_snapshot(
    source: Arc<dyn ContentSource>,
    store: &dyn SnapshotStore,
    deadline: Duration,
) -> Result<SyncReport> {
    let deadline = Instant::now() + deadline;
    let trending_source = Arc::clone(&source);
    let (trending, latest) = tokio::join!(
        fetch_before("trending", deadline, async move {
            trending_source.trending().await
        }),
        fetch_before("latest", deadline, async move { source.latest().await }),
    );
    let trending = trending.context("fetching trending titles")?;
    let latest = latest.context("fetching latest releases")?;

    if trending.is_empty() && latest.is_empty() {
        bail!("upstream returned no titles; keeping the existing snapshot");
    }

    let report = SyncReport {
        trending: trending.len(),
        latest: latest.len(),
    };
    store
        .put(SNAPSHOT_KEY, &SnapshotDocument { trending, latest })
        .await
        .context("writing snapshot document")?;

    info!(
        trending = report.trending,
        latest = report.latest,
        "snapshot refreshed"
    );
    Ok(report)
}
