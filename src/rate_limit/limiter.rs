//! Sliding window call budget for a single external API.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics;

/// Timestamps of calls still inside the window, oldest first.
#[derive(Debug, Default)]
struct SlidingWindow {
    calls: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Drop every call that has fully left the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_time(&self, now: Instant, window: Duration, max_calls: usize) -> Duration {
        if self.calls.len() < max_calls {
            return Duration::ZERO;
        }
        match self.calls.front() {
            Some(&oldest) => (oldest + window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

/// Usage snapshot for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub name: String,
    pub used: usize,
    pub max: usize,
    pub window_ms: u64,
    pub available: usize,
}

/// Sliding window rate limiter.
///
/// Cheap to clone; clones share one window so every caller of the same
/// vendor draws from the same budget.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    name: String,
    max_calls: usize,
    window: Duration,
    state: Mutex<SlidingWindow>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_calls` per `window`.
    pub fn new(name: impl Into<String>, max_calls: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                name: name.into(),
                max_calls,
                window,
                state: Mutex::new(SlidingWindow {
                    calls: VecDeque::with_capacity(max_calls),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn max_calls(&self) -> usize {
        self.inner.max_calls
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    fn lock(&self) -> MutexGuard<'_, SlidingWindow> {
        self.inner.state.lock().expect("rate limiter mutex poisoned")
    }

    /// Whether a call could be made right now without exceeding the budget.
    pub fn can_make_call(&self) -> bool {
        let mut window = self.lock();
        window.prune(Instant::now(), self.inner.window);
        window.calls.len() < self.inner.max_calls
    }

    /// Record a call made now.
    pub fn record_call(&self) {
        self.lock().calls.push_back(Instant::now());
    }

    /// Time until the next call is admitted. Zero if under budget.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut window = self.lock();
        window.prune(now, self.inner.window);
        window.wait_time(now, self.inner.window, self.inner.max_calls)
    }

    /// Wait until a call is admitted, then record it.
    ///
    /// Admission and recording happen under one lock, so concurrent
    /// throttlers never overshoot the budget.
    pub async fn throttle(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut window = self.lock();
                window.prune(now, self.inner.window);
                if window.calls.len() < self.inner.max_calls {
                    window.calls.push_back(now);
                    return;
                }
                window.wait_time(now, self.inner.window, self.inner.max_calls)
            };

            tracing::debug!(
                limiter = %self.inner.name,
                wait_ms = wait.as_millis() as u64,
                "Waiting to respect rate limit"
            );
            metrics::record_rate_limit_wait(&self.inner.name, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Current usage.
    pub fn stats(&self) -> RateLimiterStats {
        let mut window = self.lock();
        window.prune(Instant::now(), self.inner.window);
        let used = window.calls.len();
        RateLimiterStats {
            name: self.inner.name.clone(),
            used,
            max: self.inner.max_calls,
            window_ms: self.inner.window.as_millis() as u64,
            available: self.inner.max_calls.saturating_sub(used),
        }
    }

    /// Forget every recorded call.
    pub fn reset(&self) {
        self.lock().calls.clear();
    }
}
