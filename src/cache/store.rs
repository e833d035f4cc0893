//! Cache Store Module
//!
//! Synchronous query cache: HashMap storage with freshness tracking,
//! in-flight fetch tokens and age-based eviction. Shared behind
//! `Arc<RwLock<_>>` by [`QueryClient`](super::QueryClient).

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheEntry, CacheStats, QueryKey};

// == Lookup ==
/// Result of reading a key without fetching.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Entry exists and is within its freshness window
    Fresh(CacheEntry),
    /// Entry exists but is stale or invalidated
    Stale(CacheEntry),
    /// No entry for the key
    Missing,
}

/// Identifies one started fetch so its result can be discarded if superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken(u64);

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    /// Cached query results
    entries: HashMap<QueryKey, CacheEntry>,
    /// Newest started fetch per key
    in_flight: HashMap<QueryKey, FetchToken>,
    next_token: u64,
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            next_token: 0,
            stats: CacheStats::new(),
            max_entries,
        }
    }

    // == Lookup ==
    /// Reads an entry, recording a hit for fresh entries and a miss otherwise.
    pub fn lookup(&mut self, key: &QueryKey) -> Lookup {
        match self.entries.get(key) {
            Some(entry) if !entry.is_stale() => {
                self.stats.record_hit();
                Lookup::Fresh(entry.clone())
            }
            Some(entry) => {
                self.stats.record_miss();
                Lookup::Stale(entry.clone())
            }
            None => {
                self.stats.record_miss();
                Lookup::Missing
            }
        }
    }

    /// Reads an entry without touching statistics.
    pub fn peek(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Set ==
    /// Stores a value as fresh, superseding any in-flight fetch for the key.
    pub fn set(&mut self, key: QueryKey, value: Value, stale_time: Duration) {
        self.in_flight.remove(&key);
        self.insert(key, CacheEntry::new(value, stale_time));
    }

    // == Fetch Lifecycle ==
    /// Registers a new fetch for `key`. Any older fetch for the same key is
    /// superseded.
    pub fn begin_fetch(&mut self, key: &QueryKey) -> FetchToken {
        self.next_token += 1;
        let token = FetchToken(self.next_token);
        self.in_flight.insert(key.clone(), token);
        self.stats.record_fetch();
        token
    }

    /// Stores a fetch result if `token` is still the newest fetch for the key
    /// and the key has not been invalidated or set since. Returns whether the
    /// value was stored.
    pub fn complete_fetch(
        &mut self,
        key: &QueryKey,
        token: FetchToken,
        value: Value,
        stale_time: Duration,
    ) -> bool {
        if self.in_flight.get(key) != Some(&token) {
            return false;
        }
        self.in_flight.remove(key);
        self.insert(key.clone(), CacheEntry::new(value, stale_time));
        true
    }

    /// Records a failed fetch and returns the prior entry, if any, carrying
    /// the error. The stored entry only keeps the error while `token` is
    /// still the newest fetch for the key.
    pub fn fail_fetch(&mut self, key: &QueryKey, token: FetchToken, error: &str) -> Option<CacheEntry> {
        self.stats.record_fetch_failure();
        let current = self.in_flight.get(key) == Some(&token);
        if current {
            self.in_flight.remove(key);
        }

        let entry = self.entries.get_mut(key)?;
        if current {
            entry.last_error = Some(error.to_string());
            return Some(entry.clone());
        }
        let mut prior = entry.clone();
        prior.last_error = Some(error.to_string());
        Some(prior)
    }

    // == Invalidate ==
    /// Marks one entry stale without removing it. Any in-flight fetch for the
    /// key is superseded. Returns false when the key was never cached.
    pub fn invalidate(&mut self, key: &QueryKey) -> bool {
        self.in_flight.remove(key);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                self.stats.record_invalidations(1);
                true
            }
            None => false,
        }
    }

    /// Marks every entry in `namespace` stale. Returns the number of entries
    /// affected.
    pub fn invalidate_namespace(&mut self, namespace: &str) -> usize {
        self.in_flight.retain(|key, _| !key.in_namespace(namespace));

        let mut count = 0;
        for (_, entry) in self
            .entries
            .iter_mut()
            .filter(|(key, _)| key.in_namespace(namespace))
        {
            entry.invalidated = true;
            count += 1;
        }
        self.stats.record_invalidations(count);
        count
    }

    // == Remove ==
    /// Deletes an entry. Returns whether it existed.
    pub fn remove(&mut self, key: &QueryKey) -> bool {
        self.in_flight.remove(key);
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    /// Drops every entry and in-flight token.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight.clear();
        self.stats.set_total_entries(0);
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes entries older than `max_age`. Returns the number removed.
    pub fn evict_expired(&mut self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(max_age));
        let removed = before - self.entries.len();

        self.stats.record_evictions(removed);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    fn insert(&mut self, key: QueryKey, entry: CacheEntry) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(key, entry);
        self.stats.set_total_entries(self.entries.len());
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.fetched_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.in_flight.remove(&key);
            self.stats.record_evictions(1);
        }
    }
}
