//! Catalog records and the persistent snapshot store.
//!
//! The snapshot is a single JSON document (trending + latest lists) that a
//! separate sync process writes out of band. The API only ever reads it, and
//! only when the live upstream call failed. Documents live in a small SQLite
//! key/value table so the backend and the sync binary can share one file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::error::SnapshotError;

/// Key of the document that backs the home, latest and trending endpoints.
pub const SNAPSHOT_KEY: &str = "home";

/// One book as listed by the upstream source. Counts stay as the display
/// strings the source produced ("1.2M", "80 episodes").
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover_image_url: String,
    #[serde(default)]
    pub view_count: String,
    #[serde(default)]
    pub episode_count: String,
}

/// Fallback copy of the list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub trending: Vec<CatalogItem>,
    #[serde(default)]
    pub latest: Vec<CatalogItem>,
}

/// Key/value document store holding snapshot documents.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SnapshotDocument>, SnapshotError>;

    async fn put(&self, key: &str, document: &SnapshotDocument) -> Result<(), SnapshotError>;
}

/// SQLite-backed [`SnapshotStore`].
///
/// Like a plain reader it opens a short-lived connection for each query, which
/// keeps it cheap to clone and safe to use from blocking worker threads.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    db_path: PathBuf,
}

impl SqliteSnapshotStore {
    /// Opens (and if necessary creates) the database and its schema. WAL mode
    /// lets the sync process write while the API reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T, SnapshotError>
    where
        F: FnOnce(&Connection) -> Result<T, SnapshotError>,
    {
        let conn = Connection::open(&self.db_path)?;
        f(&conn)
    }

    fn read_document(&self, key: &str) -> Result<Option<SnapshotDocument>, SnapshotError> {
        self.with_connection(|conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            match body {
                Some(body) => Ok(Some(serde_json::from_str(&body)?)),
                None => Ok(None),
            }
        })
    }

    fn write_document(&self, key: &str, document: &SnapshotDocument) -> Result<(), SnapshotError> {
        let body = serde_json::to_string(document)?;
        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO documents (key, body, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at
                "#,
                params![key, body, updated_at],
            )?;
            Ok(())
        })
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<SnapshotDocument>, SnapshotError> {
        let store = self.clone();
        let key = key.to_owned();
        task::spawn_blocking(move || store.read_document(&key))
            .await
            .map_err(|err| SnapshotError::Join(err.to_string()))?
    }

    async fn put(&self, key: &str, document: &SnapshotDocument) -> Result<(), SnapshotError> {
        let store = self.clone();
        let key = key.to_owned();
        let document = document.clone();
        task::spawn_blocking(move || store.write_document(&key, &document))
            .await
            .map_err(|err| SnapshotError::Join(err.to_string()))?
    }
}
