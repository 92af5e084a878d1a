//! Keyed cache with read-time freshness checks.
//!
//! Entries are never evicted: a stale entry is simply ignored by [`TtlCache::get`]
//! until the next [`TtlCache::put`] for the same key overwrites it. Memory grows
//! with the number of distinct keys ever stored.

use std::{collections::HashMap, time::Duration};

use parking_lot::RwLock;
use tokio::time::Instant;

/// Freshness window of the search result cache.
pub const SEARCH_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Canonical form of a cache key: surrounding whitespace removed, lowercase.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    pub stored_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() <= ttl
    }
}

#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry for `key` if one exists and is still within the TTL.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let key = normalize_key(key);
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        entry.is_fresh(self.ttl).then(|| entry.clone())
    }

    /// Stores `payload` under `key`, replacing whatever was there.
    pub fn put(&self, key: &str, payload: T) {
        let key = normalize_key(key);
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            stored_at: Instant::now(),
        };
        self.entries.write().insert(key, entry);
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
