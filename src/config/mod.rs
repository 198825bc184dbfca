//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → MonitorConfig (validated)
//!     → startup builds limiters, clients and the refresh orchestrator
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → new MonitorConfig sent on a channel
//!     → refresh timing applied live; everything else needs a restart
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an empty file is a valid config
//! - A config that fails validation on reload is logged and dropped

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, MonitorConfig, PayloadFormat, RateLimitConfig,
    RefreshConfig, ServiceConfig, SourceConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
