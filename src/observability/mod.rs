//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! cache / rate_limit / resilience / client / refresh produce:
//!     → logging.rs (tracing subscriber, structured fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`service`, `key`, `stage`) instead of formatted strings
//! - Metric calls are no-ops until a recorder is installed, so library
//!   users and tests pay nothing
//! - `RUST_LOG` overrides the configured level

pub mod logging;
pub mod metrics;
