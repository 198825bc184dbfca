//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a hard deadline on every network attempt
//! - Cancel the attempt by dropping its future when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors and are never retried

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The attempt did not finish before its deadline.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Request timed out after {}ms", .0.as_millis())]
pub struct TimedOut(pub Duration);

/// Await `fut` for at most `limit`.
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T, TimedOut>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TimedOut(limit))
}
