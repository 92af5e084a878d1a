//! Content orchestration: live upstream first, snapshot second.
//!
//! List endpoints (latest, trending, home) race the upstream against the
//! deadline and quietly fall back to the persisted snapshot when it fails.
//! Detail and stream have no fallback and report the failure to the caller.
//! Search goes through the TTL cache and calls the upstream without a race.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    cache::{SEARCH_CACHE_TTL, TtlCache, normalize_key},
    catalog::{CatalogItem, SNAPSHOT_KEY, SnapshotDocument, SnapshotStore},
    error::{ContentError, SnapshotError, UpstreamError},
    stream::{self, ResolvedStream},
    upstream::{ContentSource, DEFAULT_DEADLINE, fetch_before, fetch_with_deadline},
};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Page window requested by a client. Values below 1 are clamped to 1,
/// anything unparsable falls back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        Self::new(
            parse_bounded(page).unwrap_or(DEFAULT_PAGE),
            parse_bounded(limit).unwrap_or(DEFAULT_LIMIT),
        )
    }
}

/// Parses a query integer, mapping zero and negative values to 1.
fn parse_bounded(raw: Option<&str>) -> Option<usize> {
    let value: i64 = raw?.trim().parse().ok()?;
    Some(usize::try_from(value.max(1)).unwrap_or(usize::MAX))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub has_more: bool,
}

/// Cuts `[(page-1)*limit, page*limit)` out of `items`, clipped to its length.
pub fn paginate<T: Clone>(items: &[T], request: PageRequest) -> Page<T> {
    let len = items.len();
    let start = (request.page - 1).saturating_mul(request.limit).min(len);
    let end = request.page.saturating_mul(request.limit).min(len);
    Page {
        items: items[start..end].to_vec(),
        page: request.page,
        has_more: end < len,
    }
}

/// Where a listing ended up coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Upstream,
    Snapshot,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Latest,
    Trending,
}

impl ListKind {
    fn label(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Trending => "trending",
        }
    }

    fn from_snapshot(self, document: SnapshotDocument) -> Vec<CatalogItem> {
        match self {
            Self::Latest => document.latest,
            Self::Trending => document.trending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub page: Page<CatalogItem>,
    pub origin: DataOrigin,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFeed {
    pub trending: Vec<CatalogItem>,
    pub latest: Vec<CatalogItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub items: Vec<CatalogItem>,
    pub cached: bool,
}

/// A playable episode, ready for the stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeStream {
    pub book_id: String,
    pub episode: u32,
    pub video_url: String,
    #[serde(rename = "chapterId")]
    pub chapter_id: String,
    #[serde(rename = "chapterName")]
    pub chapter_name: String,
    pub qualities: Vec<String>,
}

pub struct ContentOrchestrator {
    source: Arc<dyn ContentSource>,
    snapshots: Arc<dyn SnapshotStore>,
    search_cache: TtlCache<Vec<CatalogItem>>,
    deadline: Duration,
}

impl std::fmt::Debug for ContentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOrchestrator")
            .field("deadline", &self.deadline)
            .field("search_cache_entries", &self.search_cache.len())
            .finish_non_exhaustive()
    }
}

impl ContentOrchestrator {
    pub fn new(source: Arc<dyn ContentSource>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            snapshots,
            search_cache: TtlCache::new(SEARCH_CACHE_TTL),
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.search_cache = TtlCache::new(ttl);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn latest(&self, request: PageRequest) -> Result<Listing, SnapshotError> {
        self.listing(ListKind::Latest, request).await
    }

    pub async fn trending(&self, request: PageRequest) -> Result<Listing, SnapshotError> {
        self.listing(ListKind::Trending, request).await
    }

    /// Trending and latest, fetched concurrently under one shared deadline.
    /// Each list that fails is replaced by its snapshot counterpart.
    pub async fn home(&self) -> Result<HomeFeed, SnapshotError> {
        let deadline = Instant::now() + self.deadline;
        let (trending, latest) = tokio::join!(
            self.race_list(ListKind::Trending, deadline),
            self.race_list(ListKind::Latest, deadline),
        );

        let snapshot = if trending.is_err() || latest.is_err() {
            self.snapshots.get(SNAPSHOT_KEY).await?.unwrap_or_default()
        } else {
            SnapshotDocument::default()
        };

        let trending = trending.unwrap_or_else(|err| {
            warn!(endpoint = "home", list = "trending", error = %err, "serving snapshot");
            snapshot.trending
        });
        let latest = latest.unwrap_or_else(|err| {
            warn!(endpoint = "home", list = "latest", error = %err, "serving snapshot");
            snapshot.latest
        });

        Ok(HomeFeed {
            trending,
            latest,
            updated_at: Utc::now(),
        })
    }

    /// Cached search. A miss calls the upstream directly, without the deadline
    /// race, and only non-empty answers are cached.
    pub async fn search(&self, query: &str) -> Result<SearchResults, UpstreamError> {
        if let Some(entry) = self.search_cache.get(query) {
            info!(query = %entry.key, hits = entry.payload.len(), "search cache hit");
            return Ok(SearchResults {
                items: entry.payload,
                cached: true,
            });
        }

        let items = self.source.search(query.trim()).await.inspect_err(|err| {
            warn!(endpoint = "search", query = %normalize_key(query), error = %err, "upstream search failed");
        })?;
        if !items.is_empty() {
            self.search_cache.put(query, items.clone());
        }
        Ok(SearchResults {
            items,
            cached: false,
        })
    }

    pub async fn detail(&self, book_id: &str) -> Result<serde_json::Value, ContentError> {
        let source = Arc::clone(&self.source);
        let id = book_id.to_owned();
        let detail = fetch_with_deadline("detail", self.deadline, async move {
            source.detail(&id).await
        })
        .await
        .inspect_err(|err| {
            warn!(endpoint = "detail", book_id, error = %err, "upstream detail failed");
        })?;

        detail.ok_or_else(|| ContentError::NotFound(format!("book {book_id}")))
    }

    pub async fn stream(&self, book_id: &str, episode: u32) -> Result<EpisodeStream, ContentError> {
        let source = Arc::clone(&self.source);
        let id = book_id.to_owned();
        let candidate = fetch_with_deadline("stream", self.deadline, async move {
            source.episode_stream(&id, episode).await
        })
        .await
        .inspect_err(|err| {
            warn!(endpoint = "stream", book_id, episode, error = %err, "upstream stream failed");
        })?
        .ok_or_else(|| ContentError::NotFound(format!("episode {episode} of book {book_id}")))?;

        let ResolvedStream {
            video_url,
            qualities,
        } = stream::resolve(&candidate);
        let video_url = video_url.ok_or_else(|| ContentError::NoPlayableUrl {
            book_id: book_id.to_owned(),
            episode,
        })?;

        Ok(EpisodeStream {
            book_id: book_id.to_owned(),
            episode,
            video_url,
            chapter_id: candidate.chapter_id,
            chapter_name: candidate.chapter_name,
            qualities,
        })
    }

    async fn race_list(
        &self,
        kind: ListKind,
        deadline: Instant,
    ) -> Result<Vec<CatalogItem>, UpstreamError> {
        let source = Arc::clone(&self.source);
        fetch_before(kind.label(), deadline, async move {
            match kind {
                ListKind::Latest => source.latest().await,
                ListKind::Trending => source.trending().await,
            }
        })
        .await
    }

    async fn listing(&self, kind: ListKind, request: PageRequest) -> Result<Listing, SnapshotError> {
        let (items, origin) = match self.race_list(kind, Instant::now() + self.deadline).await {
            Ok(items) => (items, DataOrigin::Upstream),
            Err(err) => {
                warn!(endpoint = kind.label(), page = request.page, error = %err, "upstream failed; reading snapshot");
                match self.snapshots.get(SNAPSHOT_KEY).await? {
                    Some(document) => (kind.from_snapshot(document), DataOrigin::Snapshot),
                    None => (Vec::new(), DataOrigin::Empty),
                }
            }
        };

        Ok(Listing {
            page: paginate(&items, request),
            origin,
        })
    }
}
