//! In-flight request coalescing.
//!
//! # Responsibilities
//! - Let concurrent callers of the same key share one operation and its outcome
//! - Forget the operation as soon as it settles
//! - Treat registrations older than `max_age` as abandoned
//!
//! # Design Decisions
//! - Not a cache: completed results are never served from here
//! - Each operation runs on its own task, so it settles even if every
//!   caller gives up waiting
//! - The settle hook only removes its own registration, never a replacement

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;

/// Default age after which a pending entry is considered stuck.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(5000);

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct PendingRequest<T, E> {
    future: SharedOutcome<T, E>,
    started: Instant,
    id: u64,
}

/// Removes a registration when its operation settles, panics or is cancelled.
struct SettleGuard<T, E> {
    pending: Arc<DashMap<String, PendingRequest<T, E>>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for SettleGuard<T, E> {
    fn drop(&mut self) {
        let id = self.id;
        self.pending.remove_if(&self.key, |_, request| request.id == id);
    }
}

/// Collapses concurrent identical requests into one.
///
/// Operations are spawned onto the Tokio runtime; a task that panics or is
/// cancelled surfaces to every waiter as `E::from(JoinError)`.
pub struct RequestDeduplicator<T, E> {
    pending: Arc<DashMap<String, PendingRequest<T, E>>>,
    max_age: Duration,
    next_id: AtomicU64,
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new(max_age: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            max_age,
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `f` under `key`, or join the operation already in flight for it.
    ///
    /// `f` is only called when no live registration exists. It must not
    /// touch this deduplicator synchronously.
    pub async fn dedupe<F, Fut>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = match self.pending.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().started.elapsed() < self.max_age {
                    tracing::trace!(key, "Joining in-flight request");
                    occupied.get().future.clone()
                } else {
                    tracing::debug!(key, "Discarding stale in-flight request");
                    let request = self.register(key, f);
                    let future = request.future.clone();
                    occupied.insert(request);
                    future
                }
            }
            Entry::Vacant(vacant) => {
                let request = self.register(key, f);
                let future = request.future.clone();
                vacant.insert(request);
                future
            }
        };

        shared.await
    }

    fn register<F, Fut>(&self, key: &str, f: F) -> PendingRequest<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settle = SettleGuard {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
            id,
        };
        let operation = f();

        let task = tokio::spawn(async move {
            let _settle = settle;
            operation.await
        });
        let future = task
            .map(|joined| joined.unwrap_or_else(|e| Err(E::from(e))))
            .boxed()
            .shared();

        PendingRequest {
            future,
            started: Instant::now(),
            id,
        }
    }

    /// Whether a live request is in flight for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .remove_if(key, |_, request| request.started.elapsed() >= self.max_age);
        self.pending.contains_key(key)
    }

    /// Forget the registration for `key`. Callers already waiting keep waiting.
    pub fn cancel(&self, key: &str) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.pending.clear();
    }

    /// Number of registrations, including any not yet expired by `is_pending`.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T, E> Default for RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl<T, E> std::fmt::Debug for RequestDeduplicator<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("pending", &self.pending.len())
            .field("max_age", &self.max_age)
            .finish()
    }
}
