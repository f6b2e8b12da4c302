//! Recurring background sync.
//!
//! One timer drives sweeps over every enabled (user, plugin) configuration.
//! Sweeps are single-flight: a trigger that fires while a sweep is still
//! running is dropped, not queued. Units inside a sweep run one after another
//! and each runs in its own task, so an error or panic in one plugin never
//! stops the others.
//!
//! The single-flight flag is process-local. Running several instances against
//! the same database will sweep the same units concurrently.

use crate::error::SyncError;
use crate::sync::SyncOrchestrator;
use crate::types::{DateRange, SyncResult};
use chrono::NaiveDate;
use okr_sync::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default time between sweeps (1 hour).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Delay before the first sweep after `start`.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Days covered by a background sweep, ending today.
pub const SWEEP_LOOKBACK_DAYS: i64 = 7;

/// Days covered by an on-demand sync when no start date is given.
pub const ON_DEMAND_LOOKBACK_DAYS: i64 = 30;

/// Outcome of one unit inside a sweep.
#[derive(Debug)]
pub struct UnitOutcome {
    pub user_id: String,
    pub plugin_id: String,
    /// `Err` holds the failure message (sync error or panic).
    pub result: Result<SyncResult, String>,
}

impl UnitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(result) if result.success)
    }
}

/// Summary of one sweep.
#[derive(Debug)]
pub struct SweepReport {
    pub window: DateRange,
    pub outcomes: Vec<UnitOutcome>,
    /// Enabled configs whose plugin is not registered
    pub skipped: usize,
}

impl SweepReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

/// Clears the single-flight flag when the sweep ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    orchestrator: Arc<SyncOrchestrator>,
    clock: Arc<dyn Clock>,
    run_in_progress: AtomicBool,
}

impl Inner {
    async fn run_sweep(&self) -> Option<SweepReport> {
        if self
            .run_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync sweep already in progress, skipping trigger");
            return None;
        }
        let _guard = RunGuard(&self.run_in_progress);

        let window = DateRange::ending(self.clock.today(), SWEEP_LOOKBACK_DAYS);
        let mut report = SweepReport {
            window,
            outcomes: Vec::new(),
            skipped: 0,
        };

        let registry = self.orchestrator.registry();
        let configs = match registry.enabled_configs() {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to list enabled plugin configs");
                return Some(report);
            }
        };

        info!(units = configs.len(), window = %window, "Starting sync sweep");

        for config in configs {
            if registry.get(&config.plugin_id).is_none() {
                warn!(
                    user_id = %config.user_id,
                    plugin = %config.plugin_id,
                    "Enabled config references unregistered plugin, skipping"
                );
                report.skipped += 1;
                continue;
            }

            let orchestrator = Arc::clone(&self.orchestrator);
            let (user_id, plugin_id) = (config.user_id.clone(), config.plugin_id.clone());
            let unit = tokio::spawn(async move {
                orchestrator
                    .sync_plugin_data(&user_id, &plugin_id, window)
                    .await
            });

            let result = match unit.await {
                Ok(Ok(result)) => {
                    if result.success {
                        debug!(
                            user_id = %config.user_id,
                            plugin = %config.plugin_id,
                            records_imported = result.records_imported,
                            "Unit synced"
                        );
                    } else {
                        warn!(
                            user_id = %config.user_id,
                            plugin = %config.plugin_id,
                            errors = ?result.errors,
                            "Unit synced with errors"
                        );
                    }
                    Ok(result)
                }
                Ok(Err(e)) => {
                    error!(user_id = %config.user_id, plugin = %config.plugin_id, error = %e, "Unit sync failed");
                    Err(e.to_string())
                }
                Err(e) => {
                    error!(user_id = %config.user_id, plugin = %config.plugin_id, error = %e, "Unit sync task aborted");
                    Err(format!("Sync task failed: {}", e))
                }
            };

            report.outcomes.push(UnitOutcome {
                user_id: config.user_id,
                plugin_id: config.plugin_id,
                result,
            });
        }

        info!(
            units = report.outcomes.len(),
            failures = report.failures(),
            skipped = report.skipped,
            "Sync sweep finished"
        );
        Some(report)
    }
}

/// Timer-driven sync scheduler.
///
/// # Lifecycle
/// 1. `new()` builds an idle scheduler
/// 2. `start(interval)` arms the recurring trigger plus one sweep after the
///    initial delay
/// 3. `stop()` disarms the recurring trigger; a sweep already running
///    completes, and a pending initial sweep still fires
pub struct SyncScheduler {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
    initial_delay: Duration,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                clock,
                run_in_progress: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Arms the recurring trigger. Returns `false` if it is already armed.
    pub fn start(&self, interval: Duration) -> bool {
        let mut timer = self.timer();
        if timer.is_some() {
            warn!("Sync scheduler already running");
            return false;
        }

        let interval = if interval.is_zero() {
            warn!("Sync interval of zero is invalid, using default");
            DEFAULT_SYNC_INTERVAL
        } else {
            interval
        };

        let initial_delay = self.initial_delay;
        let first_tick = Instant::now() + interval;

        // The initial sweep outlives stop()
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            time::sleep(initial_delay).await;
            inner.run_sweep().await;
        });

        let inner = Arc::clone(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                spawn_sweep(&inner);
            }
        }));

        info!(
            interval_secs = interval.as_secs(),
            initial_delay_secs = initial_delay.as_secs(),
            "Sync scheduler started"
        );
        true
    }

    /// Disarms the recurring trigger. Returns `false` if it was not armed.
    ///
    /// The one-off sweep scheduled by `start` is not cancelled: stopping
    /// inside the initial delay still lets that first sweep run.
    pub fn stop(&self) -> bool {
        match self.timer().take() {
            Some(handle) => {
                handle.abort();
                info!("Sync scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Whether the recurring trigger is armed (not whether a sweep is running).
    pub fn is_running(&self) -> bool {
        self.timer().is_some()
    }

    /// Whether a sweep currently holds the single-flight flag.
    pub fn sweep_in_progress(&self) -> bool {
        self.inner.run_in_progress.load(Ordering::Acquire)
    }

    /// Runs one sweep now, on the caller's task.
    ///
    /// Returns `None` when another sweep holds the single-flight flag.
    pub async fn run_sweep(&self) -> Option<SweepReport> {
        self.inner.run_sweep().await
    }

    /// Syncs one unit on demand, bypassing the single-flight flag.
    ///
    /// `end` defaults to today; `start` defaults to 30 days before `end`.
    /// An explicit `start` after the resolved `end` is rejected before any
    /// plugin is contacted.
    pub async fn trigger_sync(
        &self,
        user_id: &str,
        plugin_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<SyncResult, SyncError> {
        let end = end.unwrap_or_else(|| self.inner.clock.today());
        let range = match start {
            Some(start) if start > end => return Err(SyncError::InvalidRange { start, end }),
            Some(start) => DateRange::new(start, end),
            None => DateRange::ending(end, ON_DEMAND_LOOKBACK_DAYS),
        };

        info!(user_id = %user_id, plugin = %plugin_id, range = %range, "On-demand sync");
        self.inner
            .orchestrator
            .sync_plugin_data(user_id, plugin_id, range)
            .await
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
    }
}

fn spawn_sweep(inner: &Arc<Inner>) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        inner.run_sweep().await;
    });
}
