use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::client::ServiceStatus;
use crate::rate_limit::RateLimiterStats;
use crate::refresh::RefreshState;

#[derive(Serialize)]
pub struct MonitorStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    pub refresh: RefreshState,
}

#[derive(Serialize)]
pub struct RefreshAccepted {
    pub quick: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub quick: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<MonitorStatus> {
    Json(MonitorStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        auto_refresh: state.orchestrator.is_auto_refreshing(),
        refresh_interval_ms: state.orchestrator.config().interval_ms,
        refresh: state.orchestrator.state(),
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(state.registry.statuses())
}

pub async fn get_rate_limits(State(state): State<AdminState>) -> Json<Vec<RateLimiterStats>> {
    Json(state.registry.rate_limiters().all_stats())
}

/// Start a cycle in the background. 409 if one is already running.
pub async fn trigger_refresh(
    State(state): State<AdminState>,
    Query(params): Query<RefreshParams>,
) -> Result<(StatusCode, Json<RefreshAccepted>), StatusCode> {
    if state.orchestrator.is_refreshing() {
        return Err(StatusCode::CONFLICT);
    }

    let orchestrator = state.orchestrator.clone();
    let quick = params.quick;
    tokio::spawn(async move {
        if quick {
            orchestrator.quick_refresh().await
        } else {
            orchestrator.refresh().await
        }
    });
    tracing::info!(quick, "Refresh triggered via admin API");

    Ok((StatusCode::ACCEPTED, Json(RefreshAccepted { quick })))
}

pub async fn reset_service(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> StatusCode {
    match state.registry.client(&name) {
        Some(client) => {
            client.reset_circuit();
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn clear_service_cache(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> StatusCode {
    match state.registry.client(&name) {
        Some(client) => {
            client.clear_cache();
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn clear_errors(State(state): State<AdminState>) -> StatusCode {
    state.orchestrator.clear_errors();
    StatusCode::NO_CONTENT
}
