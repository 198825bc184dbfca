//! Resilient GET client for one external service.
//!
//! # Request Pipeline
//! ```text
//! get(path)
//!     → cache (fresh hit returns immediately)
//!     → dedup (join an identical request already in flight)
//!     → circuit breaker (fail fast while open)
//!     → retry loop, per attempt: rate limiter → timeout → transport
//!     → success: cache and return
//!     → failure: stale cache entry if any, else the error
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{Cache, CacheStats};
use crate::client::error::FetchError;
use crate::client::transport::Transport;
use crate::config::ServiceConfig;
use crate::observability::metrics::{self, CacheOutcome};
use crate::rate_limit::RateLimiter;
use crate::resilience::{
    retry_with_backoff, with_timeout, BreakerStatus, CircuitBreaker, RequestDeduplicator,
    RetryPolicy,
};

/// A cached response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Arc<Value>),
    Text(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    Json,
    Text,
}

impl PayloadKind {
    fn key_prefix(self) -> &'static str {
        match self {
            PayloadKind::Json => "GET",
            PayloadKind::Text => "TEXT",
        }
    }

    fn accept(self) -> Option<&'static str> {
        match self {
            PayloadKind::Json => Some("application/json"),
            PayloadKind::Text => None,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub cache_ttl: Option<Duration>,
    pub skip_cache: bool,
    pub skip_dedup: bool,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Neither read the fresh cache nor fall back to a stale entry.
    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn skip_dedup(mut self) -> Self {
        self.skip_dedup = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Operator view of one client.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub circuit: BreakerStatus,
    pub cache: CacheStats,
    pub pending_requests: usize,
}

struct ClientInner {
    name: String,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    cache: Cache<Payload>,
    breaker: CircuitBreaker,
    dedup: RequestDeduplicator<Payload, FetchError>,
    limiter: Option<RateLimiter>,
    transport: Arc<dyn Transport>,
}

/// Cache, dedup, circuit breaker, retries and rate limiting in front of one
/// service. Clones share all state.
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

impl ServiceClient {
    pub fn new(
        config: &ServiceConfig,
        limiter: Option<RateLimiter>,
        dedup_max_age: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: config.name.clone(),
                base_url: config.base_url.clone().unwrap_or_default(),
                timeout: config.timeout(),
                retry: RetryPolicy {
                    retries: config.retries,
                    retry_delay: config.retry_delay(),
                },
                cache: Cache::new(config.cache_ttl()),
                breaker: CircuitBreaker::new(&config.name, &config.circuit_breaker),
                dedup: RequestDeduplicator::new(dedup_max_age),
                limiter,
                transport,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fetch JSON and decode it into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, FetchError> {
        let value = self.get_json(path, options).await?;
        T::deserialize(&*value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Fetch JSON without decoding.
    pub async fn get_json(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Arc<Value>, FetchError> {
        match self.request(PayloadKind::Json, path, options).await? {
            Payload::Json(value) => Ok(value),
            Payload::Text(_) => Err(FetchError::Decode("expected JSON payload".into())),
        }
    }

    /// Fetch a text body (RSS, XML, HTML).
    pub async fn get_text(&self, path: &str, options: RequestOptions) -> Result<String, FetchError> {
        match self.request(PayloadKind::Text, path, options).await? {
            Payload::Text(text) => Ok(text.to_string()),
            Payload::Json(_) => Err(FetchError::Decode("expected text payload".into())),
        }
    }

    async fn request(
        &self,
        kind: PayloadKind,
        path: &str,
        options: RequestOptions,
    ) -> Result<Payload, FetchError> {
        let name = self.inner.name.as_str();
        let url = format!("{}{}", self.inner.base_url, path);
        let key = format!("{}:{}", kind.key_prefix(), url);

        if !options.skip_cache {
            if let Some(hit) = self.inner.cache.get(&key) {
                metrics::record_cache_lookup(name, CacheOutcome::Hit);
                tracing::trace!(service = name, key = %key, "Cache hit");
                return Ok(hit);
            }
            metrics::record_cache_lookup(name, CacheOutcome::Miss);
        }

        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let inner = Arc::clone(&self.inner);
        let fetch = move || async move { inner.fetch_guarded(kind, &url, timeout).await };

        let start = Instant::now();
        let result = if options.skip_dedup {
            fetch().await
        } else {
            self.inner.dedup.dedupe(&key, fetch).await
        };

        match result {
            Ok(payload) => {
                metrics::record_fetch(name, "ok", start);
                self.inner
                    .cache
                    .set(key, payload.clone(), options.cache_ttl);
                Ok(payload)
            }
            Err(e) => {
                metrics::record_fetch(name, e.kind(), start);
                if !options.skip_cache {
                    if let Some(stale) = self.inner.cache.get_stale(&key) {
                        metrics::record_cache_lookup(name, CacheOutcome::Stale);
                        tracing::warn!(
                            service = name,
                            key = %key,
                            error = %e,
                            "Request failed, serving stale cache"
                        );
                        return Ok(stale);
                    }
                }
                tracing::warn!(service = name, key = %key, error = %e, "Request failed");
                Err(e)
            }
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            name: self.inner.name.clone(),
            circuit: self.inner.breaker.status(),
            cache: self.inner.cache.stats(),
            pending_requests: self.inner.dedup.len(),
        }
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        tracing::info!(service = %self.inner.name, "Cache cleared");
    }

    pub fn reset_circuit(&self) {
        self.inner.breaker.reset();
    }

    /// Drop long-expired cache entries. Returns how many were removed.
    pub fn prune_cache(&self) -> usize {
        self.inner.cache.prune()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.inner.limiter.as_ref()
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("name", &self.inner.name)
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    async fn fetch_guarded(
        &self,
        kind: PayloadKind,
        url: &str,
        timeout: Duration,
    ) -> Result<Payload, FetchError> {
        self.breaker
            .execute(move || {
                retry_with_backoff(&self.retry, move |_| self.attempt(kind, url, timeout))
            })
            .await
    }

    async fn attempt(
        &self,
        kind: PayloadKind,
        url: &str,
        timeout: Duration,
    ) -> Result<Payload, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.throttle().await;
        }

        let response = with_timeout(timeout, self.transport.get(url, kind.accept())).await??;
        if !response.is_success() {
            return Err(FetchError::Http {
                status: response.status,
                status_text: response.status_text,
            });
        }

        match kind {
            PayloadKind::Json => serde_json::from_str(&response.body)
                .map(|value| Payload::Json(Arc::new(value)))
                .map_err(|e| FetchError::Decode(e.to_string())),
            PayloadKind::Text => Ok(Payload::Text(response.body.into())),
        }
    }
}
