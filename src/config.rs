//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, RetryPolicy};

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Seconds a fetched value counts as fresh
    pub stale_time_secs: u64,
    /// Seconds an entry is retained before eviction
    pub gc_time_secs: u64,
    /// Maximum number of cached queries
    pub max_entries: usize,
    /// Retries after a failed fetch
    pub retry_count: u32,
    /// First retry delay in milliseconds, doubled per attempt
    pub retry_base_delay_ms: u64,
    /// Background eviction interval in seconds
    pub cleanup_interval: u64,
    /// Name of the session cookie read by the route guard
    pub session_cookie: String,
    /// Notifications are POSTed here when set, logged otherwise
    pub notify_webhook_url: Option<String>,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `STALE_TIME_SECS` - Freshness window (default: 30)
    /// - `GC_TIME_SECS` - Maximum retained age (default: 300)
    /// - `MAX_ENTRIES` - Maximum cached queries (default: 1000)
    /// - `RETRY_COUNT` - Fetch retries (default: 3)
    /// - `RETRY_BASE_DELAY_MS` - First retry delay (default: 1000)
    /// - `CLEANUP_INTERVAL` - Eviction frequency in seconds (default: 5)
    /// - `SESSION_COOKIE` - Session cookie name (default: session)
    /// - `NOTIFY_WEBHOOK_URL` - Notification endpoint (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            stale_time_secs: parse_var("STALE_TIME_SECS", defaults.stale_time_secs),
            gc_time_secs: parse_var("GC_TIME_SECS", defaults.gc_time_secs),
            max_entries: parse_var("MAX_ENTRIES", defaults.max_entries),
            retry_count: parse_var("RETRY_COUNT", defaults.retry_count),
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            cleanup_interval: parse_var("CLEANUP_INTERVAL", defaults.cleanup_interval),
            session_cookie: env::var("SESSION_COOKIE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.session_cookie),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Cache settings derived from this configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            stale_time: Duration::from_secs(self.stale_time_secs),
            gc_time: Duration::from_secs(self.gc_time_secs),
            max_entries: self.max_entries,
            retry: RetryPolicy {
                max_retries: self.retry_count,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            stale_time_secs: 30,
            gc_time_secs: 300,
            max_entries: 1000,
            retry_count: 3,
            retry_base_delay_ms: 1000,
            cleanup_interval: 5,
            session_cookie: "session".to_string(),
            notify_webhook_url: None,
        }
    }
}
