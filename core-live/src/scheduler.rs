//! # Live Album Scheduler
//!
//! Drives periodic reconciliation sweeps across every live definition.
//!
//! ## State Machine
//!
//! ```text
//! Stopped ──start()──> Running ──stop()──> Stopped
//! ```
//!
//! Two locks with distinct jobs:
//! - the **state lock** serializes `start`/`stop`/`is_running`
//! - the **sweep gate** admits one sweep (or single refresh) at a time, and
//!   is also held by service calls that rewrite embedded metadata
//!
//! A timer tick that finds the gate held is dropped rather than queued, so
//! overlapping triggers coalesce. `run_now()` waits for the gate instead.
//! `stop()` cancels the timer and then waits on the gate, which makes it
//! return only after an in-flight sweep has finished.
//!
//! Shutdown cancellation is observed between definitions: the definition in
//! progress completes, the rest of the sweep is skipped and reported as
//! cancelled.

use crate::carrier::EmbeddedCarrier;
use crate::definition::{DefinitionId, DefinitionSource, SearchDefinition};
use crate::error::ErrorKind;
use crate::reconciler::{ReconcileOutcome, Reconciler, RefreshOptions};
use crate::store::DefinitionStore;
use crate::{LiveAlbumError, Result};
use bridge_traits::time::{Clock, TickSource};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SchedulerEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Reports
// ============================================================================

/// What started a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepTrigger {
    Timer,
    Manual,
}

impl SweepTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepTrigger::Timer => "timer",
            SweepTrigger::Manual => "manual",
        }
    }
}

/// Why a definition's run did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Set when the failure itself could not be recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl From<&LiveAlbumError> for RunFailure {
    fn from(err: &LiveAlbumError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            persist_error: err.persist_error().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum RunResult {
    Reconciled(ReconcileOutcome),
    Failed(RunFailure),
}

/// Result for one definition within a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRunResult {
    pub definition_id: DefinitionId,
    pub name: String,
    pub source: DefinitionSource,
    #[serde(flatten)]
    pub result: RunResult,
}

/// Aggregate result of a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub trigger: SweepTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Definitions enumerated from both carriers
    pub total: usize,
    pub reconciled: usize,
    /// Hard failures, including a failed collection scan
    pub failed: usize,
    pub skipped_disabled: usize,
    pub partial_failures: usize,
    pub persistence_failures: usize,
    pub cancelled: bool,
    /// Set when scanning collections for embedded metadata failed
    pub scan_error: Option<RunFailure>,
    pub results: Vec<DefinitionRunResult>,
}

impl SweepReport {
    fn begin(trigger: SweepTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            trigger,
            started_at,
            finished_at: started_at,
            total: 0,
            reconciled: 0,
            failed: 0,
            skipped_disabled: 0,
            partial_failures: 0,
            persistence_failures: 0,
            cancelled: false,
            scan_error: None,
            results: Vec::new(),
        }
    }

    fn record(&mut self, definition: &SearchDefinition, result: Result<ReconcileOutcome>) {
        let result = match result {
            Ok(outcome) => {
                self.reconciled += 1;
                if outcome.is_partial() {
                    self.partial_failures += 1;
                }
                if outcome.persist_error.is_some() {
                    self.persistence_failures += 1;
                }
                RunResult::Reconciled(outcome)
            }
            Err(e) => {
                self.failed += 1;
                if e.persist_error().is_some() {
                    self.persistence_failures += 1;
                }
                RunResult::Failed(RunFailure::from(&e))
            }
        };

        self.results.push(DefinitionRunResult {
            definition_id: definition.id,
            name: definition.name.clone(),
            source: definition.source,
            result,
        });
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Snapshot returned by `status()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_secs: u64,
    pub last_sweep: Option<SweepReport>,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval: Duration,
}

enum SchedulerState {
    Stopped,
    Running {
        handle: JoinHandle<()>,
        timer_cancel: CancellationToken,
    },
}

struct SweepRunner {
    reconciler: Arc<Reconciler>,
    store: Arc<DefinitionStore>,
    embedded: EmbeddedCarrier,
    clock: Arc<dyn Clock>,
    sweep_gate: Arc<Mutex<()>>,
    shutdown: CancellationToken,
    last_sweep: RwLock<Option<SweepReport>>,
    event_bus: Option<EventBus>,
}

/// Periodic and on-demand sweep driver
pub struct Scheduler {
    runner: Arc<SweepRunner>,
    tick_source: Arc<dyn TickSource>,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<DefinitionStore>,
        embedded: EmbeddedCarrier,
        clock: Arc<dyn Clock>,
        tick_source: Arc<dyn TickSource>,
        settings: SchedulerSettings,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self {
            runner: Arc::new(SweepRunner {
                reconciler,
                store,
                embedded,
                clock,
                sweep_gate: Arc::new(Mutex::new(())),
                shutdown: CancellationToken::new(),
                last_sweep: RwLock::new(None),
                event_bus,
            }),
            tick_source,
            settings,
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    /// Register the periodic trigger.
    ///
    /// A no-op (with a warning) when already running, and a successful no-op
    /// when scheduling is disabled by configuration.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if !self.settings.enabled {
            info!("Live album scheduler disabled by configuration; not starting");
            return Ok(());
        }
        if matches!(*state, SchedulerState::Running { .. }) {
            warn!("Live album scheduler already running");
            return Ok(());
        }
        if self.runner.shutdown.is_cancelled() {
            return Err(LiveAlbumError::Cancelled);
        }

        let timer_cancel = self.runner.shutdown.child_token();
        let mut ticker = self.tick_source.ticker(self.settings.interval);
        let runner = Arc::clone(&self.runner);
        let cancel = timer_cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match Arc::clone(&runner.sweep_gate).try_lock_owned() {
                            Ok(_gate) => {
                                runner.sweep(SweepTrigger::Timer).await;
                            }
                            Err(_) => debug!("Sweep already in progress; skipping tick"),
                        }
                    }
                }
            }
            debug!("Scheduler timer loop exited");
        });

        *state = SchedulerState::Running {
            handle,
            timer_cancel,
        };

        info!(interval_secs = self.settings.interval.as_secs(), "Live album scheduler started");
        self.runner.emit(CoreEvent::Scheduler(SchedulerEvent::Started {
            interval_secs: self.settings.interval.as_secs(),
        }));
        Ok(())
    }

    /// Remove the periodic trigger and wait for any in-flight sweep.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let SchedulerState::Running {
            handle,
            timer_cancel,
        } = std::mem::replace(&mut *state, SchedulerState::Stopped)
        else {
            debug!("Live album scheduler already stopped");
            return Ok(());
        };

        timer_cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler timer task ended abnormally");
        }

        // A manual sweep may still hold the gate.
        drop(self.runner.sweep_gate.lock().await);

        info!("Live album scheduler stopped");
        self.runner
            .emit(CoreEvent::Scheduler(SchedulerEvent::Stopped));
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, SchedulerState::Running { .. })
    }

    /// Run a full sweep now, after any sweep already in progress
    pub async fn run_now(&self) -> SweepReport {
        let _gate = self.runner.sweep_gate.lock().await;
        self.runner.sweep(SweepTrigger::Manual).await
    }

    /// Reconcile one definition under the sweep gate
    pub async fn run_one(
        &self,
        definition: &SearchDefinition,
        options: &RefreshOptions,
    ) -> Result<ReconcileOutcome> {
        let _gate = self.runner.sweep_gate.lock().await;
        if self.runner.shutdown.is_cancelled() {
            return Err(LiveAlbumError::Cancelled);
        }
        self.runner.reconciler.reconcile(definition, options).await
    }

    /// Hold the sweep gate while embedded metadata is edited
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.runner.sweep_gate.lock().await
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running().await,
            enabled: self.settings.enabled,
            interval_secs: self.settings.interval.as_secs(),
            last_sweep: self.runner.last_sweep.read().await.clone(),
        }
    }

    /// Cancel any sweep at the next definition boundary, then stop
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down live album scheduler");
        self.runner.shutdown.cancel();
        self.stop().await
    }
}

impl SweepRunner {
    /// Every known definition from both carriers, in stable order
    async fn enumerate(&self, report: &mut SweepReport) -> Vec<SearchDefinition> {
        let mut definitions = match self.embedded.discover().await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Failed to scan collections for live metadata");
                report.failed += 1;
                report.scan_error = Some(RunFailure::from(&e));
                Vec::new()
            }
        };

        definitions.extend(self.store.list().await);
        definitions.sort_by_cached_key(SearchDefinition::sort_key);
        definitions
    }

    #[instrument(skip_all, fields(trigger = trigger.as_str()))]
    async fn sweep(&self, trigger: SweepTrigger) -> SweepReport {
        let mut report = SweepReport::begin(trigger, self.clock.now());
        self.emit(CoreEvent::Scheduler(SchedulerEvent::SweepStarted {
            trigger: trigger.as_str().to_string(),
        }));

        let definitions = self.enumerate(&mut report).await;
        report.total = definitions.len();
        info!(total = report.total, "Sweep started");

        let options = RefreshOptions::default();
        for definition in &definitions {
            if self.shutdown.is_cancelled() {
                info!(
                    completed = report.results.len(),
                    "Sweep cancelled; skipping remaining definitions"
                );
                report.cancelled = true;
                break;
            }
            if !definition.enabled {
                debug!(definition_id = %definition.id, "Skipping disabled definition");
                report.skipped_disabled += 1;
                continue;
            }

            let result = self.reconciler.reconcile(definition, &options).await;
            report.record(definition, result);
        }

        report.finished_at = self.clock.now();
        info!(
            reconciled = report.reconciled,
            failed = report.failed,
            partial = report.partial_failures,
            skipped = report.skipped_disabled,
            cancelled = report.cancelled,
            "Sweep completed"
        );

        self.emit(CoreEvent::Scheduler(SchedulerEvent::SweepCompleted {
            total: report.total as u64,
            reconciled: report.reconciled as u64,
            failed: report.failed as u64,
            cancelled: report.cancelled,
            duration_ms: report.duration().num_milliseconds().max(0) as u64,
        }));

        *self.last_sweep.write().await = Some(report.clone());
        report
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}
