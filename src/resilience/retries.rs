//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is worth repeating
//! - Re-run the attempt with linear backoff until the budget is spent
//!
//! # Design Decisions
//! - Timeouts and open-circuit rejections are never retried
//! - The last error is returned once attempts are exhausted

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::linear_backoff;

/// Classifies errors for the retry loop.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many extra attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * (n + 1)`.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. `op` receives the zero-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt >= policy.retries => return Err(e),
            Err(e) => {
                let delay = linear_backoff(attempt, policy.retry_delay);
                tracing::info!(attempt, delay = ?delay, error = %e, "Retrying request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
