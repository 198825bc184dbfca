//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Service client request
//!     → store.rs get() (fresh entries only)
//!     → on miss: fetch, then store.rs set() (timestamp = now)
//!     → on fetch failure: store.rs get_stale() (ignores TTL)
//!
//! Maintenance loop:
//!     → store.rs prune() (drops entries older than 2 × TTL)
//! ```
//!
//! # Design Decisions
//! - Staleness is computed at read time; reads never delete
//! - No capacity eviction; growth is bounded only by periodic pruning
//! - One cache per service client, so TTL policy is per service

pub mod entry;
pub mod store;

pub use entry::CacheEntry;
pub use store::{Cache, CacheStats};
