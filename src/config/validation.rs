//! Configuration validation.
//!
//! # Responsibilities
//! - Value ranges (thresholds, timeouts and windows > 0)
//! - Referential integrity (services → rate limiters, sources → services)
//! - Unique names and well-formed base URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: &MonitorConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::MonitorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("duplicate rate limiter name '{0}'")]
    DuplicateRateLimit(String),

    #[error("duplicate source label '{0}'")]
    DuplicateSource(String),

    #[error("service '{service}' has invalid base_url: {reason}")]
    InvalidBaseUrl { service: String, reason: String },

    #[error("service '{service}': {field} must be greater than zero")]
    ZeroServiceValue {
        service: String,
        field: &'static str,
    },

    #[error("rate limiter '{name}': {field} must be greater than zero")]
    ZeroRateLimitValue { name: String, field: &'static str },

    #[error("service '{service}' references unknown rate limiter '{limiter}'")]
    UnknownRateLimiter { service: String, limiter: String },

    #[error("source '{source_label}' references unknown service '{service}'")]
    UnknownService {
        source_label: String,
        service: String,
    },

    #[error("refresh.interval_ms must be greater than zero")]
    ZeroRefreshInterval,

    #[error("refresh.tertiary_delay_ms ({tertiary_ms}) is before secondary_delay_ms ({secondary_ms})")]
    StageDelaysOutOfOrder { secondary_ms: u64, tertiary_ms: u64 },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut limiters = HashSet::new();
    for limit in &config.rate_limits {
        if !limiters.insert(limit.name.as_str()) {
            errors.push(ValidationError::DuplicateRateLimit(limit.name.clone()));
        }
        for (field, value) in [
            ("max_calls", limit.max_calls as u64),
            ("window_ms", limit.window_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroRateLimitValue {
                    name: limit.name.clone(),
                    field,
                });
            }
        }
    }

    let mut services = HashSet::new();
    for service in &config.services {
        if !services.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        if let Some(base) = &service.base_url {
            if let Err(e) = url::Url::parse(base) {
                errors.push(ValidationError::InvalidBaseUrl {
                    service: service.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for (field, value) in [
            ("timeout_ms", service.timeout_ms),
            ("cache_ttl_ms", service.cache_ttl_ms),
            (
                "circuit_breaker.failure_threshold",
                u64::from(service.circuit_breaker.failure_threshold),
            ),
            (
                "circuit_breaker.half_open_requests",
                u64::from(service.circuit_breaker.half_open_requests),
            ),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroServiceValue {
                    service: service.name.clone(),
                    field,
                });
            }
        }

        if let Some(limiter) = &service.rate_limiter {
            if !limiters.contains(limiter.as_str()) {
                errors.push(ValidationError::UnknownRateLimiter {
                    service: service.name.clone(),
                    limiter: limiter.clone(),
                });
            }
        }
    }

    let mut labels = HashSet::new();
    for source in &config.sources {
        if !labels.insert(source.label.as_str()) {
            errors.push(ValidationError::DuplicateSource(source.label.clone()));
        }
        if !services.contains(source.service.as_str()) {
            errors.push(ValidationError::UnknownService {
                source_label: source.label.clone(),
                service: source.service.clone(),
            });
        }
    }

    if config.refresh.interval_ms == 0 {
        errors.push(ValidationError::ZeroRefreshInterval);
    }
    if config.refresh.tertiary_delay_ms < config.refresh.secondary_delay_ms {
        errors.push(ValidationError::StageDelaysOutOfOrder {
            secondary_ms: config.refresh.secondary_delay_ms,
            tertiary_ms: config.refresh.tertiary_delay_ms,
        });
    }
    if config.dedup.max_age_ms == 0 {
        errors.push(ValidationError::ZeroValue {
            field: "dedup.max_age_ms",
        });
    }
    if config.cache.prune_interval_ms == 0 {
        errors.push(ValidationError::ZeroValue {
            field: "cache.prune_interval_ms",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
