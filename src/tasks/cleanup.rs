//! Cache Eviction Task
//!
//! Background task that periodically drops cached queries older than the
//! configured retained age.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::QueryClient;

/// Spawns a background task that periodically evicts expired cache entries.
///
/// The task runs until aborted, sleeping for the given interval between
/// passes. Entries are judged against the client's `gc_time`.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(client: QueryClient, cleanup_interval_secs: u64) -> JoinHandle<()> {
    spawn_with_interval(client, Duration::from_secs(cleanup_interval_secs.max(1)))
}

fn spawn_with_interval(client: QueryClient, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache eviction task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.evict_expired().await;
            if removed > 0 {
                info!("Cache eviction: removed {} expired entries", removed);
            } else {
                debug!("Cache eviction: no expired entries found");
            }
        }
    })
}
