//! Outbound rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! Service client attempt
//!     → registry.rs (look up the vendor's limiter by name)
//!     → limiter.rs throttle()
//!         → prune timestamps that left the window
//!         → admit and record, or sleep until the oldest call expires
//!     → network call
//! ```
//!
//! # Design Decisions
//! - Sliding window of call timestamps, not fixed buckets
//! - Bursts up to `max_calls` pass without delay
//! - Budgets sit below the vendor's published ceiling
//! - One limiter per vendor, shared by every client that calls it

pub mod limiter;
pub mod registry;

pub use limiter::{RateLimiter, RateLimiterStats};
pub use registry::RateLimiterRegistry;
