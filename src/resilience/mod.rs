//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Service client fetch:
//!     → dedup.rs (join an identical request already in flight)
//!     → circuit_breaker.rs (fail fast while the service is down)
//!     → retries.rs (repeat transient failures with backoff.rs delays)
//!     → timeouts.rs (hard deadline per attempt)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Circuit breakers are per service, never global
//! - Retrying against an open circuit or after a timeout is pointless
//! - Each piece is usable on its own; the service client composes them

pub mod backoff;
pub mod circuit_breaker;
pub mod dedup;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitOpenError, CircuitState};
pub use dedup::RequestDeduplicator;
pub use retries::{retry_with_backoff, RetryPolicy, Retryable};
pub use timeouts::{with_timeout, TimedOut};
