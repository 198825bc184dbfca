//! Refresh orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! auto-refresh timer / admin API / CLI
//!     → RefreshOrchestrator::refresh() or quick_refresh()
//!         → stage.rs: run_stage(tier fetchers) (spawn all, settle all)
//!         → failures appended to RefreshState.errors as "<label>: <message>"
//!     → state.rs: RefreshState published on a watch channel
//!
//! sources.rs turns configured sources into fetchers over service clients.
//! ```
//!
//! # Design Decisions
//! - Tiers are fixed (critical, secondary, tertiary), not a generic scheduler
//! - A failed fetcher is data, never an error out of `refresh()`
//! - State is exposed as a snapshot plus change notification; UI binding
//!   is left to the consumer

pub mod orchestrator;
pub mod sources;
pub mod stage;
pub mod state;

pub use orchestrator::RefreshOrchestrator;
pub use sources::register_sources;
pub use stage::{run_stage, Fetcher, FetcherError, Tier};
pub use state::RefreshState;
