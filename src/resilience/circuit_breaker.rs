//! Circuit breaker for external service protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: probing whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: first can_request() after reset_timeout has elapsed
//! Half-Open → Closed: successes >= half_open_requests
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state with the remaining wait attached to the error
//! - A success in Closed heals one failure instead of clearing the count

use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned instead of calling the service while the circuit is open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Circuit breaker open for {service}. Retry after {}s", ceil_secs(.retry_after))]
pub struct CircuitOpenError {
    pub service: String,
    pub retry_after: Duration,
}

fn ceil_secs(d: &Duration) -> u64 {
    d.as_millis().div_ceil(1000) as u64
}

/// Serializable breaker snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub time_until_retry_ms: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
        }
    }

    fn time_until_retry(&self, reset_timeout: Duration) -> Duration {
        match (self.state, self.last_failure) {
            (CircuitState::Open, Some(at)) => reset_timeout.saturating_sub(at.elapsed()),
            _ => Duration::ZERO,
        }
    }
}

/// Failure-tracking gate in front of one external service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_requests: u32,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            half_open_requests: config.half_open_requests,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        metrics::record_circuit_state(&self.name, to);
        match to {
            CircuitState::Open => tracing::warn!(
                service = %self.name,
                %from,
                failures = inner.failures,
                "Circuit opened"
            ),
            _ => tracing::info!(service = %self.name, %from, %to, "Circuit transition"),
        }
    }

    /// Whether a request may go through right now.
    ///
    /// In Open, the first call after `reset_timeout` moves the breaker to
    /// Half-Open and is admitted as the probe.
    pub fn can_request(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (state, last_failure) = (inner.state, inner.last_failure);
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match last_failure {
                Some(at) if at.elapsed() > self.reset_timeout => {
                    inner.successes = 0;
                    self.transition(inner, CircuitState::HalfOpen);
                    true
                }
                _ => false,
            },
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let state = inner.state;
        match state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.half_open_requests {
                    inner.failures = 0;
                    inner.last_failure = None;
                    self.transition(inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                inner.failures = inner.failures.saturating_sub(1);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());

        let state = inner.state;
        match state {
            CircuitState::HalfOpen => self.transition(inner, CircuitState::Open),
            CircuitState::Closed if inner.failures >= self.failure_threshold => {
                self.transition(inner, CircuitState::Open)
            }
            _ => {}
        }
    }

    /// Run `f` behind the breaker.
    ///
    /// Rejects without calling `f` while open; otherwise records the outcome
    /// and hands it back unchanged.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        if !self.can_request() {
            let err = CircuitOpenError {
                service: self.name.clone(),
                retry_after: self.time_until_retry(),
            };
            tracing::debug!(service = %self.name, retry_after = ?err.retry_after, "Request rejected by open circuit");
            return Err(err.into());
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Remaining wait before an open circuit admits a probe.
    pub fn time_until_retry(&self) -> Duration {
        self.lock().time_until_retry(self.reset_timeout)
    }

    /// Force Closed with all counters cleared.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerState::closed();
        metrics::record_circuit_state(&self.name, CircuitState::Closed);
        tracing::info!(service = %self.name, "Circuit manually reset");
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            time_until_retry_ms: inner.time_until_retry(self.reset_timeout).as_millis() as u64,
        }
    }
}
