//! Cache Entry Module
//!
//! Defines the structure for individual cached query results with a
//! freshness window.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

// == Cache Entry ==
/// A stored query result with freshness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored query result
    pub value: Value,
    /// Time the value was fetched or set (Unix milliseconds)
    pub fetched_at: u64,
    /// Freshness window in milliseconds
    pub stale_after_ms: u64,
    /// Set by explicit invalidation, cleared by the next successful write
    pub invalidated: bool,
    /// Message of the most recent failed refetch, if any
    pub last_error: Option<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry.
    ///
    /// # Arguments
    /// * `value` - The query result to store
    /// * `stale_time` - How long the value is trusted without refetching
    pub fn new(value: Value, stale_time: Duration) -> Self {
        Self {
            value,
            fetched_at: current_timestamp_ms(),
            stale_after_ms: duration_ms(stale_time),
            invalidated: false,
            last_error: None,
        }
    }

    // == Is Stale ==
    /// Checks whether the entry must be refetched before it is trusted.
    ///
    /// Boundary condition: an entry is stale once the current time is greater
    /// than or equal to `fetched_at + stale_after_ms`, so a zero freshness
    /// window makes every entry stale immediately.
    pub fn is_stale(&self) -> bool {
        self.invalidated || current_timestamp_ms() >= self.fresh_until_ms()
    }

    fn fresh_until_ms(&self) -> u64 {
        self.fetched_at.saturating_add(self.stale_after_ms)
    }

    // == Age ==
    /// Milliseconds since the value was fetched.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.fetched_at)
    }

    /// Whether the entry has outlived the maximum retained age.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.age_ms() >= duration_ms(max_age)
    }

    // == Freshness Remaining ==
    /// Returns remaining freshness in milliseconds; `0` once stale.
    pub fn fresh_remaining_ms(&self) -> u64 {
        if self.invalidated {
            return 0;
        }
        self.fresh_until_ms().saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
