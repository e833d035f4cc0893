//! Query Client Module
//!
//! Async get-or-fetch front end over a shared [`CacheStore`]. One client is
//! constructed per session context and cloned into every consumer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backend::BackendResult;
use crate::cache::{CacheEntry, CacheStats, CacheStore, Lookup, QueryKey, RetryPolicy};

// == Configuration ==
/// Settings injected into a [`QueryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Default freshness window for new entries
    pub stale_time: Duration,
    /// Maximum retained age before eviction
    pub gc_time: Duration,
    /// Maximum number of entries
    pub max_entries: usize,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(300),
            max_entries: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

// == Query Result ==
/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Fresh cached entry, no backend read
    Cache,
    /// Fetched from the backend just now
    Network,
    /// Last-known value returned because the refetch failed
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub data: Value,
    pub source: CacheSource,
    /// Unix milliseconds of the fetch that produced `data`
    pub fetched_at: u64,
    /// Refetch failure, present only when `source` is `Stale`
    pub error: Option<String>,
}

impl QueryResult {
    fn from_entry(entry: CacheEntry, source: CacheSource) -> Self {
        Self {
            data: entry.value,
            source,
            fetched_at: entry.fetched_at,
            error: entry.last_error,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.source == CacheSource::Stale
    }
}

// == Query Client ==
#[derive(Debug, Clone)]
pub struct QueryClient {
    store: Arc<RwLock<CacheStore>>,
    config: CacheConfig,
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(CacheStore::new(config.max_entries))),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Get Or Fetch ==
    /// Returns the cached value if fresh, otherwise fetches it.
    ///
    /// On fetch failure the prior value is returned with source
    /// [`CacheSource::Stale`] and the error message attached; without a prior
    /// value the error is returned.
    pub async fn get_or_fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> BackendResult<QueryResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<Value>>,
    {
        self.get_or_fetch_with(key, self.config.stale_time, fetcher)
            .await
    }

    /// [`get_or_fetch`](Self::get_or_fetch) with a per-entry freshness window.
    pub async fn get_or_fetch_with<F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> BackendResult<QueryResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<Value>>,
    {
        if let Lookup::Fresh(entry) = self.store.write().await.lookup(key) {
            debug!(query = %key, "Cache hit");
            return Ok(QueryResult::from_entry(entry, CacheSource::Cache));
        }
        self.fetch(key, stale_time, fetcher).await
    }

    /// Always fetches, ignoring freshness. For reads that back decisions with
    /// consistency requirements.
    pub async fn fetch_fresh<F, Fut>(&self, key: &QueryKey, fetcher: F) -> BackendResult<QueryResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<Value>>,
    {
        self.fetch(key, self.config.stale_time, fetcher).await
    }

    async fn fetch<F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> BackendResult<QueryResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<Value>>,
    {
        let token = self.store.write().await.begin_fetch(key);
        let label = key.to_string();

        match self.config.retry.run(&label, fetcher).await {
            Ok(value) => {
                let stored = self.store.write().await.complete_fetch(
                    key,
                    token,
                    value.clone(),
                    stale_time,
                );
                if !stored {
                    debug!(query = %key, "Fetch superseded, result not cached");
                }
                Ok(QueryResult {
                    data: value,
                    source: CacheSource::Network,
                    fetched_at: crate::cache::current_timestamp_ms(),
                    error: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                let prior = self.store.write().await.fail_fetch(key, token, &message);
                match prior {
                    Some(entry) => {
                        warn!(query = %key, error = %message, "Fetch failed, serving last-known value");
                        Ok(QueryResult::from_entry(entry, CacheSource::Stale))
                    }
                    None => {
                        warn!(query = %key, error = %message, "Fetch failed with no cached value");
                        Err(err)
                    }
                }
            }
        }
    }

    // == Explicit Operations ==
    /// Writes a value directly, e.g. after a local mutation.
    pub async fn set(&self, key: QueryKey, value: Value) {
        self.store
            .write()
            .await
            .set(key, value, self.config.stale_time);
    }

    /// Reads the current entry without fetching or touching statistics.
    pub async fn peek(&self, key: &QueryKey) -> Option<QueryResult> {
        let store = self.store.read().await;
        store.peek(key).cloned().map(|entry| {
            let source = if entry.is_stale() {
                CacheSource::Stale
            } else {
                CacheSource::Cache
            };
            QueryResult::from_entry(entry, source)
        })
    }

    /// Marks one entry stale. Unknown keys are a no-op returning `false`.
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        self.store.write().await.invalidate(key)
    }

    /// Marks every entry in the namespace stale and returns how many.
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.store.write().await.invalidate_namespace(namespace)
    }

    /// Applies several namespace invalidations under one lock acquisition,
    /// in the given order.
    pub async fn invalidate_namespaces<'a, I>(&self, namespaces: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut store = self.store.write().await;
        namespaces
            .into_iter()
            .map(|ns| store.invalidate_namespace(ns))
            .sum()
    }

    pub async fn remove(&self, key: &QueryKey) -> bool {
        self.store.write().await.remove(key)
    }

    /// Drops every entry, e.g. on logout.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    /// Removes entries older than the configured `gc_time`.
    pub async fn evict_expired(&self) -> usize {
        self.store.write().await.evict_expired(self.config.gc_time)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}
