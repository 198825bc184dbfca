//! Resilient service clients.
//!
//! # Data Flow
//! ```text
//! ServiceRegistry (built once from MonitorConfig)
//!     → one ServiceClient per service
//!         → Cache<Payload>, RequestDeduplicator, CircuitBreaker (owned)
//!         → RateLimiter (shared by vendor)
//!         → Transport (shared reqwest client)
//! ```
//!
//! # Design Decisions
//! - Each service has its own cache, breaker and dedup map, so one vendor
//!   failing never affects another
//! - Limiters are shared because the budget belongs to the vendor, not the client
//! - Callers that need fresh data opt out per call via `RequestOptions`

pub mod error;
pub mod registry;
pub mod service;
pub mod transport;

pub use error::FetchError;
pub use registry::ServiceRegistry;
pub use service::{Payload, RequestOptions, ServiceClient, ServiceStatus};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
