//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monitor_fetch_total` (counter): fetches by service, outcome
//! - `monitor_fetch_duration_seconds` (histogram): end-to-end fetch latency
//! - `monitor_cache_lookups_total` (counter): cache hits/misses/stale fallbacks
//! - `monitor_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `monitor_rate_limit_wait_seconds` (histogram): time spent throttled
//! - `monitor_refresh_stage_errors` (gauge): errors in the last stage run
//! - `monitor_refresh_stage_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - Recorder is installed only when enabled in config
//! - Labels are service or stage names, never URLs

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Stale,
}

impl CacheOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Stale => "stale",
        }
    }
}

pub fn record_cache_lookup(service: &str, outcome: CacheOutcome) {
    ::metrics::counter!(
        "monitor_cache_lookups_total",
        "service" => service.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a finished fetch. `outcome` is "ok" or the error kind.
pub fn record_fetch(service: &str, outcome: &'static str, start: Instant) {
    ::metrics::counter!(
        "monitor_fetch_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "monitor_fetch_duration_seconds",
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("monitor_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_rate_limit_wait(limiter: &str, waited: Duration) {
    ::metrics::histogram!(
        "monitor_rate_limit_wait_seconds",
        "limiter" => limiter.to_string()
    )
    .record(waited.as_secs_f64());
}

pub fn record_refresh_stage(stage: &'static str, errors: usize, duration: Duration) {
    ::metrics::gauge!("monitor_refresh_stage_errors", "stage" => stage).set(errors as f64);
    ::metrics::histogram!("monitor_refresh_stage_duration_seconds", "stage" => stage)
        .record(duration.as_secs_f64());
}
