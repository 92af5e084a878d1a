//! Upstream content source and the deadline race wrapped around it.
//!
//! The race spawns the upstream call as its own task and waits for its answer
//! on a oneshot channel under a timer. When the timer wins, the task is left
//! running and its late result is dropped with a warning. The HTTP source
//! bounds each request with its own timeout so an abandoned call still gives
//! its blocking thread back.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::{
    sync::oneshot,
    task,
    time::{Instant, timeout_at},
};
use tracing::{debug, warn};

use crate::{catalog::CatalogItem, error::UpstreamError, stream::StreamCandidate};

/// Deadline applied to every raced upstream call.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(25_000);

/// The scraper that produces catalog data. Implementations are expected to be
/// slow and to fail now and then.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Newest releases, as shown on the home page.
    async fn latest(&self) -> Result<Vec<CatalogItem>, UpstreamError>;

    async fn trending(&self) -> Result<Vec<CatalogItem>, UpstreamError>;

    async fn search(&self, query: &str) -> Result<Vec<CatalogItem>, UpstreamError>;

    /// `Ok(None)` when the source does not know the book.
    async fn detail(&self, book_id: &str) -> Result<Option<serde_json::Value>, UpstreamError>;

    /// `Ok(None)` when the source does not know the episode.
    async fn episode_stream(
        &self,
        book_id: &str,
        episode: u32,
    ) -> Result<Option<StreamCandidate>, UpstreamError>;
}

/// Runs `operation` against a deadline `deadline` from now.
pub async fn fetch_with_deadline<T, F>(
    label: &'static str,
    deadline: Duration,
    operation: F,
) -> Result<T, UpstreamError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    fetch_before(label, Instant::now() + deadline, operation).await
}

/// Runs `operation` against an absolute deadline so several calls can share
/// one.
pub async fn fetch_before<T, F>(
    label: &'static str,
    deadline: Instant,
    operation: F,
) -> Result<T, UpstreamError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    let started = Instant::now();
    let (tx, rx) = oneshot::channel();
    task::spawn(async move {
        let outcome = operation.await;
        if tx.send(outcome).is_err() {
            warn!(
                operation = label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upstream answered after the deadline; result discarded"
            );
        }
    });

    match timeout_at(deadline, rx).await {
        Ok(Ok(outcome)) => {
            debug!(
                operation = label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "upstream settled"
            );
            outcome
        }
        Ok(Err(_)) => Err(UpstreamError::Aborted),
        Err(_) => Err(UpstreamError::Timeout(
            deadline.saturating_duration_since(started),
        )),
    }
}

/// [`ContentSource`] backed by a scraper service speaking JSON over HTTP.
///
/// Every call runs a blocking `ureq` request on the blocking pool, bounded by
/// the agent's overall timeout.
#[derive(Debug, Clone)]
pub struct HttpContentSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpContentSource {
    /// `timeout` caps a whole request (connect, headers and body). Pass the
    /// race deadline so a call nobody waits for any more ends soon after.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("dramafeed/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { base_url, agent }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs a collection. The scraper always has one, so a 404 here is a
    /// failed call like any other status.
    async fn get_list(
        &self,
        path: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.get_json(path, query)
            .await?
            .ok_or_else(|| UpstreamError::request(format!("{path} answered 404")))
    }

    /// GETs `{base}{path}` and decodes the JSON body. A 404 maps to `Ok(None)`.
    async fn get_json<T>(
        &self,
        path: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Option<T>, UpstreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, path);
        task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            for (name, value) in &query {
                request = request.query(name, value);
            }
            match request.call() {
                Ok(response) => response
                    .into_json::<T>()
                    .map(Some)
                    .map_err(|err| UpstreamError::request(format!("decoding {url}: {err}"))),
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(err) => Err(UpstreamError::request(format!("{url}: {err}"))),
            }
        })
        .await
        .map_err(|_| UpstreamError::Aborted)?
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn latest(&self) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.get_list("/latest", Vec::new()).await
    }

    async fn trending(&self) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.get_list("/trending", Vec::new()).await
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.get_list("/search", vec![("q", query.to_owned())]).await
    }

    async fn detail(&self, book_id: &str) -> Result<Option<serde_json::Value>, UpstreamError> {
        self.get_json("/detail", vec![("bookId", book_id.to_owned())])
            .await
    }

    async fn episode_stream(
        &self,
        book_id: &str,
        episode: u32,
    ) -> Result<Option<StreamCandidate>, UpstreamError> {
        self.get_json(
            "/stream",
            vec![("bookId", book_id.to_owned()), ("episode", episode.to_string())],
        )
        .await
    }
}
