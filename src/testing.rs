//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    catalog::{CatalogItem, SNAPSHOT_KEY, SnapshotDocument, SnapshotStore},
    error::{AuthError, SnapshotError, UpstreamError},
    security::{Claims, IdentityVerifier},
    stream::{CdnGroup, QualitySource, StreamCandidate},
};

pub(crate) fn items(prefix: &str, count: usize) -> Vec<CatalogItem> {
    (0..count)
        .map(|index| CatalogItem {
            id: format!("{prefix}{index}"),
            title: format!("{prefix} title {index}"),
            cover_image_url: format!("https://img.example/{prefix}{index}.jpg"),
            view_count: format!("{index}K"),
            episode_count: "60".into(),
        })
        .collect()
}

pub(crate) fn candidate(urls: &[&str]) -> StreamCandidate {
    let cdn_groups = if urls.is_empty() {
        Vec::new()
    } else {
        vec![CdnGroup {
            qualities: urls.iter().copied().map(QualitySource::from).collect(),
        }]
    };
    StreamCandidate {
        chapter_id: "chapter-1".into(),
        chapter_name: "Episode 1".into(),
        cdn_groups,
    }
}

/// Scripted [`crate::upstream::ContentSource`]. Every call sleeps for `delay`
/// before answering.
pub(crate) struct FakeSource {
    latest: Result<Vec<CatalogItem>, String>,
    trending: Result<Vec<CatalogItem>, String>,
    search: Result<Vec<CatalogItem>, String>,
    detail: Result<Option<serde_json::Value>, String>,
    stream: Result<Option<StreamCandidate>, String>,
    delay: Duration,
    pub(crate) calls: AtomicUsize,
    pub(crate) search_calls: AtomicUsize,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            latest: Ok(Vec::new()),
            trending: Ok(Vec::new()),
            search: Ok(Vec::new()),
            detail: Ok(None),
            stream: Ok(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeSource {
    pub(crate) fn with_latest(mut self, items: Vec<CatalogItem>) -> Self {
        self.latest = Ok(items);
        self
    }

    pub(crate) fn failing_latest(mut self, message: &str) -> Self {
        self.latest = Err(message.into());
        self
    }

    pub(crate) fn with_trending(mut self, items: Vec<CatalogItem>) -> Self {
        self.trending = Ok(items);
        self
    }

    pub(crate) fn failing_trending(mut self, message: &str) -> Self {
        self.trending = Err(message.into());
        self
    }

    pub(crate) fn with_search(mut self, items: Vec<CatalogItem>) -> Self {
        self.search = Ok(items);
        self
    }

    pub(crate) fn failing_search(mut self, message: &str) -> Self {
        self.search = Err(message.into());
        self
    }

    pub(crate) fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Ok(Some(detail));
        self
    }

    pub(crate) fn failing_detail(mut self, message: &str) -> Self {
        self.detail = Err(message.into());
        self
    }

    pub(crate) fn with_stream(mut self, candidate: StreamCandidate) -> Self {
        self.stream = Ok(Some(candidate));
        self
    }

    pub(crate) fn failing_stream(mut self, message: &str) -> Self {
        self.stream = Err(message.into());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn respond<T: Clone>(&self, scripted: &Result<T, String>) -> Result<T, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        scripted.clone().map_err(UpstreamError::Request)
    }
}

#[async_trait]
impl crate::upstream::ContentSource for FakeSource {
    async fn latest(&self) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.respond(&self.latest).await
    }

    async fn trending(&self) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.respond(&self.trending).await
    }

    async fn search(&self, _query: &str) -> Result<Vec<CatalogItem>, UpstreamError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.search).await
    }

    async fn detail(&self, _book_id: &str) -> Result<Option<serde_json::Value>, UpstreamError> {
        self.respond(&self.detail).await
    }

    async fn episode_stream(
        &self,
        _book_id: &str,
        _episode: u32,
    ) -> Result<Option<StreamCandidate>, UpstreamError> {
        self.respond(&self.stream).await
    }
}

/// [`SnapshotStore`] over a map. A broken store fails every call.
#[derive(Default)]
pub(crate) struct MemorySnapshots {
    documents: Mutex<HashMap<String, SnapshotDocument>>,
    broken: bool,
}

impl MemorySnapshots {
    pub(crate) fn with_home(document: SnapshotDocument) -> Self {
        let store = Self::default();
        store
            .documents
            .lock()
            .insert(SNAPSHOT_KEY.to_owned(), document);
        store
    }

    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub(crate) fn document(&self, key: &str) -> Option<SnapshotDocument> {
        self.documents.lock().get(key).cloned()
    }

    fn check(&self) -> Result<(), SnapshotError> {
        if self.broken {
            return Err(SnapshotError::Join("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshots {
    async fn get(&self, key: &str) -> Result<Option<SnapshotDocument>, SnapshotError> {
        self.check()?;
        Ok(self.document(key))
    }

    async fn put(&self, key: &str, document: &SnapshotDocument) -> Result<(), SnapshotError> {
        self.check()?;
        self.documents
            .lock()
            .insert(key.to_owned(), document.clone());
        Ok(())
    }
}

/// Accepts exactly one token.
pub(crate) struct FakeVerifier {
    valid_token: String,
    pub(crate) calls: AtomicUsize,
}

impl FakeVerifier {
    pub(crate) fn accepting(token: &str) -> Self {
        Self {
            valid_token: token.to_owned(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn claims() -> Claims {
        Claims {
            uid: "user-1".into(),
            email: Some("viewer@example.com".into()),
            name: Some("Viewer".into()),
            picture: None,
        }
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token == self.valid_token {
            Ok(Self::claims())
        } else {
            Err(AuthError::InvalidToken("unknown token".into()))
        }
    }
}

/// Serves a router on a random localhost port until dropped. Stands in for
/// the scraper and the identity provider in the HTTP client tests.
pub(crate) struct TestHttpServer {
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestHttpServer {
    pub(crate) async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test HTTP listener");
        let addr = listener.local_addr().expect("read test listener address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("run test HTTP server");
        });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}
