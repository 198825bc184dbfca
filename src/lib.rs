//! Situation Monitor Library
//!
//! Resilient data-fetch layer for a news and markets dashboard: per-service
//! caches, vendor rate limiters, request coalescing, circuit breakers and a
//! three-tier refresh orchestrator.

pub mod admin;
pub mod cache;
pub mod client;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod rate_limit;
pub mod refresh;
pub mod resilience;

pub use client::{RequestOptions, ServiceClient, ServiceRegistry};
pub use config::MonitorConfig;
pub use lifecycle::{Monitor, Shutdown};
pub use refresh::{RefreshOrchestrator, RefreshState, Tier};
