//! Observable refresh state.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::refresh::stage::Tier;

/// Snapshot published to subscribers after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshState {
    pub is_refreshing: bool,
    pub current_stage: Option<Tier>,
    /// Wall-clock completion of the last finished cycle, Unix milliseconds.
    pub last_refresh_ms: Option<u64>,
    /// Failures accumulated since the current or last cycle started.
    pub errors: Vec<String>,
    /// Correlation id of the current or last cycle.
    pub cycle_id: Option<Uuid>,
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
