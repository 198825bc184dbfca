//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     MonitorConfig → ServiceRegistry + RefreshOrchestrator → background tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop auto-refresh → broadcast stop → await tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then clients, then timers and listeners
//! - Shutdown has a grace period; stragglers are logged, not awaited forever

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Monitor, StartupError};
