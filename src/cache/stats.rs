//! Cache Statistics Module
//!
//! Tracks query cache metrics including hits, misses, fetches and
//! invalidations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks query cache metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a fresh entry
    pub hits: u64,
    /// Lookups that found no entry or a stale one
    pub misses: u64,
    /// Backend fetches started
    pub fetches: u64,
    /// Fetches that failed after all retries
    pub fetch_failures: u64,
    /// Entries marked stale by explicit invalidation
    pub invalidations: u64,
    /// Entries removed for age or capacity
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_fetch_failure(&mut self) {
        self.fetch_failures += 1;
    }

    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
