//! Three-tier staged refresh.
//!
//! # Cycle
//! ```text
//! refresh():
//!     t=0                         critical tier (settle all)
//!     + secondary_delay           secondary tier
//!     + (tertiary - secondary)    tertiary tier
//!     → stamp last_refresh
//! ```
//!
//! # Design Decisions
//! - At most one cycle in flight; overlapping calls return immediately
//! - The running flag is released by a guard, so an aborted cycle never
//!   leaves the orchestrator stuck
//! - A panic inside the cycle is caught and recorded as `Refresh failed: ..`
//! - Auto-refresh spawns each cycle, so a slow cycle delays nothing;
//!   ticks that land on a running cycle are dropped by the guard

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RefreshConfig;
use crate::observability::metrics;
use crate::refresh::stage::{run_stage, Fetcher, FetcherError, Tier};
use crate::refresh::state::{unix_millis, RefreshState};

struct Inner {
    fetchers: RwLock<HashMap<Tier, Vec<Fetcher>>>,
    config: ArcSwap<RefreshConfig>,
    running: AtomicBool,
    state: watch::Sender<RefreshState>,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the running flag for the lifetime of one cycle.
struct RunningGuard<'a> {
    inner: &'a Inner,
}

impl<'a> RunningGuard<'a> {
    fn acquire(inner: &'a Inner) -> Option<Self> {
        inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { inner })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        // Clear the flag first so watchers that see the idle state can start a cycle.
        self.inner.running.store(false, Ordering::Release);
        self.inner.state.send_modify(|state| {
            state.is_refreshing = false;
            state.current_stage = None;
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Drives registered fetchers through critical, secondary and tertiary
/// stages. Clones share all state.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
}

impl RefreshOrchestrator {
    pub fn new(config: RefreshConfig) -> Self {
        let (state, _) = watch::channel(RefreshState::default());
        Self {
            inner: Arc::new(Inner {
                fetchers: RwLock::new(HashMap::new()),
                config: ArcSwap::from_pointee(config),
                running: AtomicBool::new(false),
                state,
                auto_refresh: Mutex::new(None),
            }),
        }
    }

    /// Add a fetcher to `tier`. Fetchers run in every later cycle.
    pub fn register<F, Fut>(&self, tier: Tier, label: impl Into<String>, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FetcherError>> + Send + 'static,
    {
        self.register_fetcher(tier, Fetcher::new(label, fetch));
    }

    pub fn register_fetcher(&self, tier: Tier, fetcher: Fetcher) {
        tracing::debug!(stage = %tier, label = fetcher.label(), "Fetcher registered");
        self.inner
            .fetchers
            .write()
            .expect("fetcher registry lock poisoned")
            .entry(tier)
            .or_default()
            .push(fetcher);
    }

    /// Snapshot of the fetchers registered for `tier`.
    pub fn fetchers(&self, tier: Tier) -> Vec<Fetcher> {
        self.inner
            .fetchers
            .read()
            .expect("fetcher registry lock poisoned")
            .get(&tier)
            .cloned()
            .unwrap_or_default()
    }

    pub fn config(&self) -> RefreshConfig {
        RefreshConfig::clone(&self.inner.config.load())
    }

    /// Run a full three-stage cycle.
    ///
    /// Returns false without doing anything if a cycle is already running.
    pub async fn refresh(&self) -> bool {
        let Some(_running) = RunningGuard::acquire(&self.inner) else {
            tracing::debug!("Refresh already in progress, skipping");
            return false;
        };

        let cycle = self.begin_cycle();
        let config = self.inner.config.load_full();

        let outcome = AssertUnwindSafe(async {
            let started = Instant::now();
            self.run_tier(Tier::Critical).await;

            time::sleep(config.secondary_delay()).await;
            self.run_tier(Tier::Secondary).await;

            time::sleep(config.tertiary_delay().saturating_sub(config.secondary_delay())).await;
            self.run_tier(Tier::Tertiary).await;

            self.complete_cycle(started);
        })
        .catch_unwind()
        .instrument(tracing::info_span!("refresh", cycle = %cycle))
        .await;

        if let Err(panic) = outcome {
            self.record_cycle_failure(panic.as_ref());
        }
        true
    }

    /// Run only the critical stage. Shares the in-flight guard with `refresh`.
    pub async fn quick_refresh(&self) -> bool {
        let Some(_running) = RunningGuard::acquire(&self.inner) else {
            tracing::debug!("Refresh already in progress, skipping quick refresh");
            return false;
        };

        let cycle = self.begin_cycle();
        let outcome = AssertUnwindSafe(async {
            let started = Instant::now();
            self.run_tier(Tier::Critical).await;
            self.complete_cycle(started);
        })
        .catch_unwind()
        .instrument(tracing::info_span!("quick_refresh", cycle = %cycle))
        .await;

        if let Err(panic) = outcome {
            self.record_cycle_failure(panic.as_ref());
        }
        true
    }

    fn begin_cycle(&self) -> Uuid {
        let cycle = Uuid::new_v4();
        self.inner.state.send_modify(|state| {
            state.is_refreshing = true;
            state.current_stage = None;
            state.errors.clear();
            state.cycle_id = Some(cycle);
        });
        cycle
    }

    fn complete_cycle(&self, started: Instant) {
        let mut failed = 0;
        self.inner.state.send_modify(|state| {
            state.last_refresh_ms = Some(unix_millis());
            failed = state.errors.len();
        });
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            errors = failed,
            "Refresh cycle complete"
        );
    }

    fn record_cycle_failure(&self, panic: &(dyn Any + Send)) {
        let message = panic_message(panic);
        tracing::error!(error = message, "Refresh cycle failed");
        self.inner
            .state
            .send_modify(|state| state.errors.push(format!("Refresh failed: {message}")));
    }

    async fn run_tier(&self, tier: Tier) {
        let fetchers = self.fetchers(tier);
        self.inner
            .state
            .send_modify(|state| state.current_stage = Some(tier));

        let started = Instant::now();
        let errors = run_stage(&fetchers).await;
        metrics::record_refresh_stage(tier.as_str(), errors.len(), started.elapsed());

        for error in &errors {
            tracing::warn!(stage = %tier, error = %error, "Fetcher failed");
        }
        tracing::debug!(
            stage = %tier,
            fetchers = fetchers.len(),
            failed = errors.len(),
            "Stage settled"
        );

        if !errors.is_empty() {
            self.inner
                .state
                .send_modify(|state| state.errors.extend(errors));
        }
    }

    fn lock_auto(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .auto_refresh
            .lock()
            .expect("auto-refresh mutex poisoned")
    }

    /// Start refreshing on the configured interval, beginning immediately.
    ///
    /// Replaces any timer already running. Must be called within a Tokio
    /// runtime.
    pub fn start_auto_refresh(&self) {
        // tokio's interval panics on a zero period
        let interval = self.inner.config.load().interval().max(Duration::from_millis(1));
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let orchestrator = RefreshOrchestrator { inner };
                tokio::spawn(async move {
                    orchestrator.refresh().await;
                });
            }
        });

        if let Some(previous) = self.lock_auto().replace(handle) {
            previous.abort();
        }
        tracing::info!(interval_ms = interval.as_millis() as u64, "Auto-refresh started");
    }

    /// Stop the timer. A cycle already in flight runs to completion.
    pub fn stop_auto_refresh(&self) -> bool {
        match self.lock_auto().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("Auto-refresh stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.lock_auto()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Change the auto-refresh period; restarts the timer only if it is running.
    pub fn set_refresh_interval(&self, interval: Duration) {
        let interval_ms = interval.as_millis() as u64;
        self.inner.config.rcu(|current| RefreshConfig {
            interval_ms,
            ..RefreshConfig::clone(current)
        });
        tracing::info!(interval_ms, "Refresh interval updated");

        if self.is_auto_refreshing() {
            self.start_auto_refresh();
        }
    }

    /// Swap in new timing. Delays apply from the next cycle; an interval
    /// change restarts a running timer.
    pub fn apply_config(&self, config: RefreshConfig) {
        let interval_changed = self.inner.config.load().interval_ms != config.interval_ms;
        self.inner.config.store(Arc::new(config));
        tracing::info!("Refresh configuration applied");

        if interval_changed && self.is_auto_refreshing() {
            self.start_auto_refresh();
        }
    }

    pub fn clear_errors(&self) {
        self.inner.state.send_modify(|state| state.errors.clear());
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RefreshState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.inner.state.subscribe()
    }
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("config", &self.config())
            .field("is_refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter(
        orchestrator: &RefreshOrchestrator,
        tier: Tier,
        label: &str,
    ) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        orchestrator.register(tier, label, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_delays_are_cumulative_from_start() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        for tier in Tier::ALL {
            let log = log.clone();
            orchestrator.register(tier, tier.as_str(), move || {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push((tier, start.elapsed()));
                    Ok(())
                }
            });
        }

        assert!(orchestrator.refresh().await);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Tier::Critical, Duration::ZERO),
                (Tier::Secondary, Duration::from_millis(2000)),
                (Tier::Tertiary, Duration::from_millis(4000)),
            ]
        );

        let state = orchestrator.state();
        assert!(!state.is_refreshing);
        assert_eq!(state.current_stage, None);
        assert!(state.last_refresh_ms.is_some());
        assert!(state.cycle_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_a_noop() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let news = counter(&orchestrator, Tier::Critical, "News");

        let (first, second) = tokio::join!(orchestrator.refresh(), orchestrator.refresh());
        assert!(first);
        assert!(!second);
        assert_eq!(news.load(Ordering::SeqCst), 1);

        let (quick, full) = tokio::join!(orchestrator.quick_refresh(), orchestrator.refresh());
        assert!(quick);
        assert!(!full, "quick refresh shares the guard");
        assert_eq!(news.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_collected_and_reset_each_cycle() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let fail = Arc::new(AtomicBool::new(true));
        let f = fail.clone();
        orchestrator.register(Tier::Secondary, "Intel", move || {
            let failing = f.load(Ordering::SeqCst);
            async move {
                if failing {
                    Err(FetcherError::new("HTTP 503: Service Unavailable"))
                } else {
                    Ok(())
                }
            }
        });
        let markets = counter(&orchestrator, Tier::Tertiary, "Polymarket");

        orchestrator.refresh().await;
        assert_eq!(
            orchestrator.state().errors,
            vec!["Intel: HTTP 503: Service Unavailable"]
        );
        assert_eq!(markets.load(Ordering::SeqCst), 1, "later tiers still run");

        fail.store(false, Ordering::SeqCst);
        orchestrator.refresh().await;
        assert!(orchestrator.state().errors.is_empty());

        fail.store(true, Ordering::SeqCst);
        orchestrator.refresh().await;
        orchestrator.clear_errors();
        assert!(orchestrator.state().errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_refresh_runs_only_critical() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let critical = counter(&orchestrator, Tier::Critical, "News");
        let secondary = counter(&orchestrator, Tier::Secondary, "Crypto");

        let start = Instant::now();
        assert!(orchestrator.quick_refresh().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(critical.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.load(Ordering::SeqCst), 0);
        assert!(orchestrator.state().last_refresh_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_stage_is_published() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let rx = orchestrator.subscribe();
        orchestrator.register(Tier::Secondary, "StageCheck", move || {
            let stage = rx.borrow().current_stage;
            async move {
                match stage {
                    Some(Tier::Secondary) => Ok(()),
                    other => Err(FetcherError::new(format!("saw {other:?}"))),
                }
            }
        });

        let mut watcher = orchestrator.subscribe();
        orchestrator.refresh().await;
        assert!(watcher.has_changed().unwrap());
        assert!(!watcher.borrow_and_update().is_refreshing);
        assert!(orchestrator.state().errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_cycle_releases_guard() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let news = counter(&orchestrator, Tier::Critical, "News");

        let o = orchestrator.clone();
        let task = tokio::spawn(async move { o.refresh().await });
        time::sleep(Duration::from_millis(100)).await;
        assert!(orchestrator.is_refreshing());
        assert_eq!(orchestrator.state().current_stage, Some(Tier::Critical));

        task.abort();
        let _ = task.await;
        assert!(!orchestrator.is_refreshing());
        assert!(!orchestrator.state().is_refreshing);
        assert_eq!(orchestrator.state().last_refresh_ms, None);

        assert!(orchestrator.quick_refresh().await);
        assert_eq!(news.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetcher_panicking_before_its_future_is_contained() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        orchestrator.register(
            Tier::Critical,
            "Gdelt",
            || -> std::future::Ready<Result<(), FetcherError>> { panic!("factory bug") },
        );
        let secondary = counter(&orchestrator, Tier::Secondary, "Crypto");

        let o = orchestrator.clone();
        let ran = tokio::spawn(async move { o.refresh().await }).await;
        assert!(matches!(ran, Ok(true)), "cycle survives the panic");
        assert_eq!(secondary.load(Ordering::SeqCst), 1, "later tiers still run");

        let state = orchestrator.state();
        assert_eq!(state.errors, vec!["Gdelt: fetcher panicked"]);
        assert!(!state.is_refreshing);
        assert!(state.last_refresh_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_failure_is_recorded() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let news = counter(&orchestrator, Tier::Critical, "News");

        let inner = Arc::clone(&orchestrator.inner);
        let poisoner = std::thread::spawn(move || {
            let _registry = inner.fetchers.write().unwrap();
            panic!("poison the fetcher registry");
        });
        assert!(poisoner.join().is_err());

        assert!(orchestrator.refresh().await);
        let state = orchestrator.state();
        assert_eq!(state.errors.len(), 1);
        assert!(
            state.errors[0].starts_with("Refresh failed: fetcher registry lock poisoned"),
            "got {:?}",
            state.errors
        );
        assert!(!state.is_refreshing);
        assert_eq!(state.last_refresh_ms, None, "failed cycle is not stamped");
        assert!(!orchestrator.is_refreshing());
        assert_eq!(news.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_can_refresh_once_idle_is_published() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig::default());
        let news = counter(&orchestrator, Tier::Critical, "News");

        let mut rx = orchestrator.subscribe();
        let o = orchestrator.clone();
        let follower = tokio::spawn(async move {
            rx.wait_for(|state| state.cycle_id.is_some() && !state.is_refreshing)
                .await
                .unwrap();
            o.quick_refresh().await
        });

        assert!(orchestrator.quick_refresh().await);
        assert!(follower.await.unwrap(), "running flag cleared before idle is published");
        assert_eq!(news.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_lifecycle() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig {
            interval_ms: 10_000,
            ..RefreshConfig::default()
        });
        let news = counter(&orchestrator, Tier::Critical, "News");

        orchestrator.start_auto_refresh();
        assert!(orchestrator.is_auto_refreshing());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(news.load(Ordering::SeqCst), 1, "first cycle runs immediately");

        time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(news.load(Ordering::SeqCst), 2);

        assert!(orchestrator.stop_auto_refresh());
        assert!(!orchestrator.stop_auto_refresh());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(news.load(Ordering::SeqCst), 2);

        orchestrator.set_refresh_interval(Duration::from_secs(5));
        assert!(!orchestrator.is_auto_refreshing(), "stopped timer stays stopped");
        assert_eq!(orchestrator.config().interval_ms, 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_restarts_running_timer() {
        let orchestrator = RefreshOrchestrator::new(RefreshConfig {
            interval_ms: 60_000,
            ..RefreshConfig::default()
        });
        let news = counter(&orchestrator, Tier::Critical, "News");

        orchestrator.start_auto_refresh();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(news.load(Ordering::SeqCst), 1);

        orchestrator.apply_config(RefreshConfig {
            interval_ms: 6000,
            ..RefreshConfig::default()
        });
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(news.load(Ordering::SeqCst), 2, "restart runs a cycle immediately");

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(news.load(Ordering::SeqCst), 3);
        orchestrator.stop_auto_refresh();
    }
}
