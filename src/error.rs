//! Error types shared by the orchestration layer and the access gate.

use std::time::Duration;

use thiserror::Error;

/// Failure of a call to the upstream content source.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream did not answer within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream task ended without a result")]
    Aborted,
}

impl UpstreamError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Outcome of the detail and stream operations when no payload can be served.
#[derive(Debug, Clone, Error)]
pub enum ContentError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("no playable url for episode {episode} of {book_id}")]
    NoPlayableUrl { book_id: String, episode: u32 },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Session verification failures. The gate does not distinguish between the
/// variants; every one of them means "not signed in".
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("session token missing")]
    MissingToken,
    #[error("session token rejected: {0}")]
    InvalidToken(String),
    #[error("identity provider unreachable: {0}")]
    Provider(String),
}

/// Failures of the persistent snapshot store.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("snapshot document is malformed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("snapshot store task failed: {0}")]
    Join(String),
    #[error("snapshot store io error: {0}")]
    Io(#[from] std::io::Error),
}
