//! Named rate limiters, one per external vendor.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::rate_limit::limiter::{RateLimiter, RateLimiterStats};

/// Registry of vendor rate limiters built from configuration.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterRegistry {
    limiters: HashMap<String, RateLimiter>,
}

impl RateLimiterRegistry {
    /// Build one limiter per configured vendor.
    pub fn new(configs: &[RateLimitConfig]) -> Self {
        let limiters = configs
            .iter()
            .map(|c| {
                let limiter =
                    RateLimiter::new(&c.name, c.max_calls, Duration::from_millis(c.window_ms));
                (c.name.clone(), limiter)
            })
            .collect();
        Self { limiters }
    }

    /// Look up a limiter by vendor name.
    pub fn get(&self, name: &str) -> Option<RateLimiter> {
        self.limiters.get(name).cloned()
    }

    /// Usage of every limiter, sorted by name.
    pub fn all_stats(&self) -> Vec<RateLimiterStats> {
        let mut stats: Vec<_> = self.limiters.values().map(RateLimiter::stats).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
