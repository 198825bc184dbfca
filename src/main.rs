//! Situation Monitor
//!
//! Keeps a news and markets dashboard's data sources warm without
//! hammering vendors or blanking the screen when one of them fails.
//!
//! # Architecture Overview
//!
//! ```text
//!   refresh orchestrator        tiers: critical → secondary → tertiary
//!          │
//!          ▼
//!   ServiceClient (one per service)
//!     cache → dedup → circuit breaker → retry/timeout
//!          │
//!          ▼
//!   rate_limit (one per vendor) ───▶ vendor APIs
//!
//!   cross-cutting: config (toml + hot reload), observability, admin, lifecycle
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use situation_monitor::client::ReqwestTransport;
use situation_monitor::config::{load_config, validate_config, ConfigError, MonitorConfig};
use situation_monitor::lifecycle::startup::parse_addr;
use situation_monitor::observability::{logging, metrics};
use situation_monitor::Monitor;

#[derive(Parser)]
#[command(name = "situation-monitor", version)]
#[command(about = "Staged, rate-limited refresh of dashboard data sources", long_about = None)]
struct Cli {
    /// Path to the TOML config file (watched for changes).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one full refresh cycle, print the result and exit.
    #[arg(long, conflicts_with = "quick")]
    once: bool,

    /// Run one critical-tier refresh, print the result and exit.
    #[arg(long)]
    quick: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = MonitorConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        services = config.services.len(),
        sources = config.sources.len(),
        "situation-monitor starting"
    );

    if config.observability.metrics_enabled {
        let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let transport = Arc::new(ReqwestTransport::new()?);
    let monitor = Monitor::build(config, transport);

    if cli.once || cli.quick {
        let ran = if cli.quick {
            monitor.orchestrator.quick_refresh().await
        } else {
            monitor.orchestrator.refresh().await
        };
        let state = monitor.orchestrator.state();
        println!("{}", serde_json::to_string_pretty(&state)?);
        if !ran || !state.errors.is_empty() {
            std::process::exit(1);
        }
        return Ok(());
    }

    monitor.run(cli.config).await?;
    Ok(())
}
