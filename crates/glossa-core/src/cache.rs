//! Result cache boundary.
//!
//! Search result sets live in an external cache engine, chunked under
//! namespaced keys:
//!
//! ```text
//! {prefix}:{results_id}:meta      -> ResultsMeta (JSON)
//! {prefix}:{results_id}:chunk:{k} -> up to CHUNK_SIZE results (JSON)
//! ```
//!
//! [`ResultCache`] is the engine-agnostic interface; values are opaque
//! strings (the search service serializes JSON into them). [`MemoryCache`]
//! is the built-in TTL-expiring implementation backing tests and the CLI.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::Result;

/// Key for a result set's metadata record.
#[must_use]
pub fn meta_key(prefix: &str, results_id: &str) -> String {
    format!("{prefix}:{results_id}:meta")
}

/// Key for one chunk of a result set.
#[must_use]
pub fn chunk_key(prefix: &str, results_id: &str, chunk: usize) -> String {
    format!("{prefix}:{results_id}:chunk:{chunk}")
}

/// External cache boundary with per-entry time-to-live.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Fetch a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a time-to-live.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Evict a key if present.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache.
///
/// Entries expire lazily on read and are swept on write, so a quiet cache
/// holds at most the keys written since the last put.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
