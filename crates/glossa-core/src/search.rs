//! Citation-aware search with chunked, cached pagination.
//!
//! A search executes once against storage, snapshots the full ordered
//! result list into the external cache in chunks, and returns the first
//! page with an opaque `results_id`. Subsequent pages stream from the
//! cache without touching storage:
//!
//! ```text
//! {prefix}:{id}:meta      -> total, page size hint, creation time, TTL
//! {prefix}:{id}:chunk:{k} -> up to chunk_size results
//! ```
//!
//! Concurrent searches for the same query each get their own snapshot and
//! id. Cache failures during the fill degrade gracefully: the first page
//! and total still come back, and later `get_page` calls report the set as
//! expired so clients re-run the search. Cache reads retry with bounded
//! backoff before surfacing an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{chunk_key, meta_key, ResultCache};
use crate::config::SearchConfig;
use crate::storage::{SearchQuery, Storage};
use crate::types::{ResultsMeta, ResultsPage, SearchResult};
use crate::util::{opaque_id, with_timeout};
use crate::{Error, Result};

/// Options for one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Match token lemmas instead of surface forms.
    pub search_lemma: bool,
    /// Restrict to sentences sharing at least one of these categories.
    pub categories: Vec<String>,
    /// Page size; defaults to the configured default, capped at the max.
    pub page_size: Option<usize>,
    /// Result set TTL; defaults to the configured default.
    pub ttl_seconds: Option<u64>,
}

/// Response of a fresh search: the snapshot id, its first page, and the
/// total result count.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Opaque id addressing the cached snapshot.
    pub results_id: String,
    /// First `page_size` results.
    pub first_page: Vec<SearchResult>,
    /// Total results in the snapshot.
    pub total: usize,
}

/// Search and pagination service over the storage and cache boundaries.
pub struct SearchService {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn ResultCache>,
    config: SearchConfig,
    snapshot_nonce: AtomicU64,
}

impl SearchService {
    /// Create a service from its collaborators.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn ResultCache>, config: SearchConfig) -> Self {
        Self {
            storage,
            cache,
            config,
            snapshot_nonce: AtomicU64::new(0),
        }
    }

    fn resolve_page_size(&self, requested: Option<usize>) -> Result<usize> {
        let page_size = requested.unwrap_or(self.config.default_page_size);
        if page_size == 0 {
            return Err(Error::Validation("page_size must be at least 1".to_string()));
        }
        if page_size > self.config.max_page_size {
            return Err(Error::Validation(format!(
                "page_size {page_size} exceeds maximum {}",
                self.config.max_page_size
            )));
        }
        Ok(page_size)
    }

    /// Run a search and snapshot its results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for out-of-range options and
    /// [`Error::Storage`] when the query itself fails. Cache write
    /// failures are logged, not surfaced.
    pub async fn search(&self, query: &str, opts: SearchOptions) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        let page_size = self.resolve_page_size(opts.page_size)?;
        let ttl_seconds = opts.ttl_seconds.unwrap_or(self.config.default_ttl_seconds);

        let results = with_timeout(
            Duration::from_secs(self.config.storage_timeout_seconds),
            "sentence search",
            self.storage.search_sentences(&SearchQuery {
                query: query.to_string(),
                search_lemma: opts.search_lemma,
                categories: opts.categories,
            }),
        )
        .await?;
        let total = results.len();

        // Each search snapshots under a fresh id, so concurrent calls for
        // the same query never share cache entries.
        let nonce = self.snapshot_nonce.fetch_add(1, Ordering::Relaxed);
        let results_id = opaque_id(
            "rs",
            &format!("{query}:{nonce}:{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
        );

        let meta = ResultsMeta {
            total,
            page_size_hint: page_size,
            created_at: Utc::now(),
            ttl_seconds,
        };
        if let Err(e) = self.fill_cache(&results_id, &meta, &results).await {
            warn!(
                results_id = %results_id,
                error = %e,
                "cache fill failed; result set will not be pageable"
            );
        }

        let first_page = results.iter().take(page_size).cloned().collect();
        debug!(results_id = %results_id, total, page_size, "search snapshot created");
        Ok(SearchResponse {
            results_id,
            first_page,
            total,
        })
    }

    /// Fetch one page of a cached snapshot.
    ///
    /// Pages past the end of the set return an empty result list. A
    /// missing or expired snapshot fails with [`Error::ResultsExpired`].
    pub async fn get_page(
        &self,
        results_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<ResultsPage> {
        if page == 0 {
            return Err(Error::Validation("page numbers are 1-based".to_string()));
        }
        let page_size = self.resolve_page_size(Some(page_size))?;

        let meta_raw = self
            .cache_get(&meta_key(&self.config.cache_prefix, results_id))
            .await?
            .ok_or_else(|| Error::ResultsExpired(results_id.to_string()))?;
        let meta: ResultsMeta = serde_json::from_str(&meta_raw)?;

        let start = (page - 1) * page_size;
        if start >= meta.total {
            return Ok(ResultsPage {
                results: Vec::new(),
                page,
                page_size,
                total: meta.total,
            });
        }
        let end = (start + page_size).min(meta.total);

        // A page spans at most two consecutive chunks.
        let chunk_size = self.config.chunk_size.max(1);
        let first_chunk = start / chunk_size;
        let last_chunk = (end - 1) / chunk_size;

        let mut window: Vec<SearchResult> = Vec::with_capacity(end - start);
        for chunk in first_chunk..=last_chunk {
            let raw = self
                .cache_get(&chunk_key(&self.config.cache_prefix, results_id, chunk))
                .await?
                .ok_or_else(|| Error::ResultsExpired(results_id.to_string()))?;
            let mut results: Vec<SearchResult> = serde_json::from_str(&raw)?;
            window.append(&mut results);
        }

        let offset = start - first_chunk * chunk_size;
        let results = window
            .into_iter()
            .skip(offset)
            .take(end - start)
            .collect();
        Ok(ResultsPage {
            results,
            page,
            page_size,
            total: meta.total,
        })
    }

    /// Evict a snapshot from the cache.
    pub async fn invalidate(&self, results_id: &str) -> Result<()> {
        let prefix = &self.config.cache_prefix;
        let Some(meta_raw) = self.cache_get(&meta_key(prefix, results_id)).await? else {
            return Ok(());
        };
        let meta: ResultsMeta = serde_json::from_str(&meta_raw)?;
        let chunks = meta.total.div_ceil(self.config.chunk_size.max(1));
        for chunk in 0..chunks {
            self.cache.delete(&chunk_key(prefix, results_id, chunk)).await?;
        }
        self.cache.delete(&meta_key(prefix, results_id)).await?;
        Ok(())
    }

    /// Write the meta record and result chunks for a snapshot.
    async fn fill_cache(
        &self,
        results_id: &str,
        meta: &ResultsMeta,
        results: &[SearchResult],
    ) -> Result<()> {
        let prefix = &self.config.cache_prefix;
        let ttl = Duration::from_secs(meta.ttl_seconds);
        let cache_timeout = Duration::from_secs(self.config.cache_timeout_seconds);

        with_timeout(
            cache_timeout,
            "cache meta write",
            self.cache.put(
                &meta_key(prefix, results_id),
                serde_json::to_string(meta)?,
                ttl,
            ),
        )
        .await?;

        for (index, chunk) in results.chunks(self.config.chunk_size.max(1)).enumerate() {
            with_timeout(
                cache_timeout,
                "cache chunk write",
                self.cache.put(
                    &chunk_key(prefix, results_id, index),
                    serde_json::to_string(chunk)?,
                    ttl,
                ),
            )
            .await?;
        }
        Ok(())
    }

    /// Cache read with bounded exponential backoff.
    async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let cache_timeout = Duration::from_secs(self.config.cache_timeout_seconds);
        let mut delay = Duration::from_millis(self.config.cache_retry_base_ms);
        let mut attempt = 0;
        loop {
            match with_timeout(cache_timeout, "cache read", self.cache.get(key)).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.config.cache_read_retries
                    && (e.is_recoverable() || matches!(e, Error::Cache(_))) =>
                {
                    attempt += 1;
                    debug!(key, attempt, error = %e, "retrying cache read");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
