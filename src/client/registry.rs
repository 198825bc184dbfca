//! Composition root for service clients.
//!
//! # Responsibilities
//! - Build one client per configured service, wired to its vendor limiter
//! - Hand out shared clients by name
//! - Periodically prune every client cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::client::service::{ServiceClient, ServiceStatus};
use crate::client::transport::Transport;
use crate::config::MonitorConfig;
use crate::rate_limit::RateLimiterRegistry;

/// Every client and limiter in the process, built once at startup.
#[derive(Debug)]
pub struct ServiceRegistry {
    clients: HashMap<String, ServiceClient>,
    limiters: RateLimiterRegistry,
    prune_interval: Duration,
}

impl ServiceRegistry {
    pub fn from_config(config: &MonitorConfig, transport: Arc<dyn Transport>) -> Self {
        let limiters = RateLimiterRegistry::new(&config.rate_limits);
        let dedup_max_age = Duration::from_millis(config.dedup.max_age_ms);

        let clients = config
            .services
            .iter()
            .map(|service| {
                let limiter = service.rate_limiter.as_deref().and_then(|name| {
                    let found = limiters.get(name);
                    if found.is_none() {
                        tracing::warn!(service = %service.name, limiter = name, "Unknown rate limiter; client runs unthrottled");
                    }
                    found
                });
                let client =
                    ServiceClient::new(service, limiter, dedup_max_age, Arc::clone(&transport));
                (service.name.clone(), client)
            })
            .collect::<HashMap<_, _>>();

        tracing::info!(
            services = clients.len(),
            rate_limiters = limiters.len(),
            "Service registry built"
        );

        Self {
            clients,
            limiters,
            prune_interval: Duration::from_millis(config.cache.prune_interval_ms),
        }
    }

    pub fn client(&self, name: &str) -> Option<ServiceClient> {
        self.clients.get(name).cloned()
    }

    /// Service names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Status of every client, sorted by name.
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.names()
            .into_iter()
            .filter_map(|name| self.clients.get(name))
            .map(ServiceClient::status)
            .collect()
    }

    pub fn rate_limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    /// Prune every client cache. Returns the total removed.
    pub fn prune_all(&self) -> usize {
        self.clients.values().map(ServiceClient::prune_cache).sum()
    }

    /// Prune caches on a fixed interval until shutdown.
    pub async fn run_maintenance(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.prune_interval, "Cache maintenance starting");
        let mut ticker = time::interval(self.prune_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pruned = self.prune_all();
                    if pruned > 0 {
                        tracing::debug!(pruned, "Cache maintenance pass");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache maintenance received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
