//! Tiers and the settle-all stage runner.

use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::client::FetchError;

/// Fixed refresh priority classes, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    Secondary,
    Tertiary,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Critical, Tier::Secondary, Tier::Tertiary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::Secondary => "secondary",
            Tier::Tertiary => "tertiary",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a fetcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FetcherError(String);

impl FetcherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<FetchError> for FetcherError {
    fn from(e: FetchError) -> Self {
        Self(e.to_string())
    }
}

impl From<String> for FetcherError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for FetcherError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

type FetchFn = dyn Fn() -> BoxFuture<'static, Result<(), FetcherError>> + Send + Sync;

/// A labelled fetcher. Clones share the same function.
#[derive(Clone)]
pub struct Fetcher {
    label: String,
    fetch: Arc<FetchFn>,
}

impl Fetcher {
    pub fn new<F, Fut>(label: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FetcherError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            fetch: Arc::new(move || fetch().boxed()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("label", &self.label).finish()
    }
}

/// Run every fetcher concurrently and wait for all of them.
///
/// Returns one `"<label>: <message>"` entry per failure, in registration
/// order. A failing or panicking fetcher never affects its siblings, even
/// when it panics before returning its future.
pub async fn run_stage(fetchers: &[Fetcher]) -> Vec<String> {
    let handles = fetchers.iter().map(|f| {
        let fetch = Arc::clone(&f.fetch);
        tokio::spawn(async move { fetch().await })
    });
    let outcomes = join_all(handles).await;

    fetchers
        .iter()
        .zip(outcomes)
        .filter_map(|(fetcher, outcome)| match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{}: {}", fetcher.label, e)),
            Err(join) if join.is_panic() => Some(format!("{}: fetcher panicked", fetcher.label)),
            Err(_) => Some(format!("{}: fetcher cancelled", fetcher.label)),
        })
        .collect()
}
