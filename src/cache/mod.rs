//! Cache Module
//!
//! Provides the client-side query cache: freshness windows, explicit
//! invalidation, retry on failed fetches and age-based eviction.

mod client;
mod entry;
mod key;
mod retry;
mod stats;
mod store;


// Re-export public types
pub use client::{CacheConfig, CacheSource, QueryClient, QueryResult};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::QueryKey;
pub use retry::RetryPolicy;
pub use stats::CacheStats;
pub use store::{CacheStore, FetchToken, Lookup};
