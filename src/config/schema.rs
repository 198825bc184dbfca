//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::refresh::Tier;

/// Root configuration for the situation monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// External services, one resilient client each.
    pub services: Vec<ServiceConfig>,

    /// Vendor call budgets.
    pub rate_limits: Vec<RateLimitConfig>,

    /// Refresh cycle timing.
    pub refresh: RefreshConfig,

    /// In-flight request coalescing.
    pub dedup: DedupConfig,

    /// Cache maintenance.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Fetch sources driven by the refresh cycle.
    pub sources: Vec<SourceConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            services: default_services(),
            rate_limits: default_rate_limits(),
            refresh: RefreshConfig::default(),
            dedup: DedupConfig::default(),
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// One external service and its resilience settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service identifier for logging, metrics and source lookup.
    pub name: String,

    /// Prefix prepended verbatim to every request path.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Default cache TTL in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional attempts after the first.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base retry delay in milliseconds (linear backoff).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Name of the vendor rate limiter to throttle through, if any.
    #[serde(default)]
    pub rate_limiter: Option<String>,
}

impl ServiceConfig {
    /// A service with every setting at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            cache_ttl_ms: default_cache_ttl_ms(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: None,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures in Closed before the circuit opens.
    pub failure_threshold: u32,

    /// Time in Open before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Successful probes needed to close from Half-Open.
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
            half_open_requests: 1,
        }
    }
}

/// Sliding window budget for one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub name: String,
    pub max_calls: usize,
    pub window_ms: u64,
}

/// Refresh cycle timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Auto-refresh period in milliseconds.
    pub interval_ms: u64,

    /// Offset of the secondary tier from cycle start.
    pub secondary_delay_ms: u64,

    /// Offset of the tertiary tier from cycle start (not from secondary).
    pub tertiary_delay_ms: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn secondary_delay(&self) -> Duration {
        Duration::from_millis(self.secondary_delay_ms)
    }

    pub fn tertiary_delay(&self) -> Duration {
        Duration::from_millis(self.tertiary_delay_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            secondary_delay_ms: 2000,
            tertiary_delay_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Age after which an in-flight registration is treated as stuck.
    pub max_age_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { max_age_ms: 5000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How often every service cache is pruned.
    pub prune_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prune_interval_ms: 60_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Payload type a source expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Text,
}

/// A fetch the refresh cycle runs through one service client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Label used in the refresh error list.
    pub label: String,

    pub tier: Tier,

    /// Name of the service client to fetch through.
    pub service: String,

    /// Request path, appended to the service base URL.
    pub path: String,

    #[serde(default)]
    pub format: PayloadFormat,
}

/// The services the dashboard talks to, with their per-vendor tuning.
pub fn default_services() -> Vec<ServiceConfig> {
    let breaker = |failure_threshold, reset_timeout_ms| CircuitBreakerConfig {
        failure_threshold,
        reset_timeout_ms,
        half_open_requests: 1,
    };

    vec![
        ServiceConfig {
            timeout_ms: 15_000,
            ..ServiceConfig::named("news")
        },
        ServiceConfig {
            cache_ttl_ms: 60_000,
            circuit_breaker: breaker(2, 20_000),
            rate_limiter: Some("finnhub".into()),
            ..ServiceConfig::named("markets")
        },
        ServiceConfig {
            base_url: Some("https://api.coingecko.com/api/v3".into()),
            cache_ttl_ms: 60_000,
            rate_limiter: Some("coingecko".into()),
            ..ServiceConfig::named("crypto")
        },
        ServiceConfig {
            cache_ttl_ms: 10 * 60 * 1000,
            circuit_breaker: breaker(5, 60_000),
            ..ServiceConfig::named("intel")
        },
        ServiceConfig {
            base_url: Some("https://gamma-api.polymarket.com".into()),
            circuit_breaker: breaker(3, 45_000),
            rate_limiter: Some("polymarket".into()),
            ..ServiceConfig::named("polymarket")
        },
    ]
}

/// Vendor budgets, each set below the published ceiling.
pub fn default_rate_limits() -> Vec<RateLimitConfig> {
    let limit = |name: &str, max_calls, window_ms| RateLimitConfig {
        name: name.to_string(),
        max_calls,
        window_ms,
    };

    vec![
        limit("finnhub", 55, 60_000),
        limit("coingecko", 25, 60_000),
        limit("polymarket", 90, 60_000),
        limit("congress", 4500, 60 * 60 * 1000),
        limit("usaspending", 100, 60_000),
        limit("fred", 100, 60_000),
        limit("feargreed", 30, 60_000),
    ]
}
