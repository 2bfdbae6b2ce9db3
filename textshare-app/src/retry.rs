//! Retry policy for store writes.

use std::future::Future;
use std::time::Duration;

use textshare_sync::StoreError;

/// How many times to attempt an operation and how long to wait in between.
///
/// Only transient failures ([`StoreError::is_transient`]) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below one is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt.
    pub fn fail_fast() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Three attempts, one second apart.
    pub fn backoff() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::warn!("{what} failed (attempt {attempt}/{attempts}): {e}");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempts > 1 {
                        log::error!("{what} failed after {attempt} attempt(s): {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}
