//! Retry Policy Module
//!
//! Bounded exponential back-off for failed fetches. Client-class failures
//! are returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::backend::{BackendError, BackendResult};

/// How failed fetches are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fails on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether a failure after `retries_done` retries should be retried.
    pub fn should_retry(&self, retries_done: u32, error: &BackendError) -> bool {
        retries_done < self.max_retries && !error.is_client_error()
    }

    /// Runs `operation` until it succeeds or the policy gives up.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut retries_done = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(retries_done, &err) => {
                    let delay = self.delay_for(retries_done);
                    debug!(
                        query = label,
                        retry = retries_done + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries_done += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}
