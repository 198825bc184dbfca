//! Errors surfaced by service clients.

use thiserror::Error;
use tokio::task::JoinError;

use crate::resilience::{CircuitOpenError, Retryable, TimedOut};

/// Why a fetch produced no data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Non-2xx response.
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },

    /// Connection or protocol failure before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Timeout(#[from] TimedOut),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Body was not valid JSON, or did not match the requested type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The spawned request task panicked or was cancelled.
    #[error("Request task failed: {0}")]
    Task(String),
}

impl From<JoinError> for FetchError {
    fn from(e: JoinError) -> Self {
        FetchError::Task(e.to_string())
    }
}

impl FetchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http",
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::CircuitOpen(_) => "circuit_open",
            FetchError::Decode(_) => "decode",
            FetchError::Task(_) => "task",
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::Timeout(_) | FetchError::CircuitOpen(_) | FetchError::Task(_)
        )
    }
}
