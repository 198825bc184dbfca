//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the service registry and refresh orchestrator from config
//! - Start background tasks (cache maintenance, auto-refresh, admin API,
//!   config watcher)
//! - Stop them in order on shutdown
//!
//! # Design Decisions
//! - Fail fast: a bad bind address or watcher error is fatal at startup
//! - Background tasks get a bounded grace period to exit

use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::client::{ServiceRegistry, Transport};
use crate::config::{ConfigError, ConfigWatcher, MonitorConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_shutdown_signal;
use crate::refresh::{register_sources, RefreshOrchestrator};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid {field} '{value}': {source}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Parse a configured socket address.
pub fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|source| StartupError::Address {
        field,
        value: value.to_string(),
        source,
    })
}

/// The wired-up monitor: clients, limiters and the refresh orchestrator.
pub struct Monitor {
    pub config: MonitorConfig,
    pub registry: Arc<ServiceRegistry>,
    pub orchestrator: RefreshOrchestrator,
}

impl Monitor {
    /// Wire every subsystem from a validated config.
    pub fn build(config: MonitorConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(ServiceRegistry::from_config(&config, transport));
        let orchestrator = RefreshOrchestrator::new(config.refresh.clone());
        register_sources(&orchestrator, &registry, &config.sources);

        Self {
            config,
            registry,
            orchestrator,
        }
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            registry: Arc::clone(&self.registry),
            orchestrator: self.orchestrator.clone(),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
        }
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// With `config_path`, the file is watched and refresh timing is
    /// applied on change.
    pub async fn run(self, config_path: Option<PathBuf>) -> Result<(), StartupError> {
        let shutdown = Shutdown::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        tasks.push(tokio::spawn(
            Arc::clone(&self.registry).run_maintenance(shutdown.subscribe()),
        ));

        if self.config.admin.enabled {
            let addr = parse_addr("admin.bind_address", &self.config.admin.bind_address)?;
            let state = self.admin_state();
            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(state, addr, rx).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        // Dropping the watcher handle stops notifications.
        let _watcher = match config_path {
            Some(path) => {
                let (watcher, mut updates) = ConfigWatcher::new(&path);
                let handle = watcher.run()?;
                let orchestrator = self.orchestrator.clone();
                let mut rx = shutdown.subscribe();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            Some(config) = updates.recv() => orchestrator.apply_config(config.refresh),
                            _ = rx.recv() => break,
                        }
                    }
                }));
                Some(handle)
            }
            None => None,
        };

        self.orchestrator.start_auto_refresh();
        tracing::info!(
            services = self.registry.names().len(),
            admin = self.config.admin.enabled,
            "Situation monitor running"
        );

        wait_for_shutdown_signal().await;
        tracing::info!("Shutting down");

        self.orchestrator.stop_auto_refresh();
        shutdown.trigger();

        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Background task failed"),
                Err(_) => tracing::warn!("Background task did not stop within grace period"),
            }
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
