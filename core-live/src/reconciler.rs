//! # Reconciler
//!
//! Executes one reconciliation pass for one definition: search, fetch the
//! destination's current contents, diff, apply the delta through the
//! catalog's bulk calls, and record the run.
//!
//! ## Phases
//!
//! ```text
//! resolve destination → search → fetch current → diff
//!     → (dry run: report only)
//!     → bulk add → bulk remove (full-sync) → record stats
//! ```
//!
//! Membership, not history, drives the diff, so re-running after a crash or
//! a partial failure only applies what is still missing.

use crate::carrier::{bounded, EmbeddedCarrier};
use crate::definition::{DefinitionId, DefinitionSource, RunStats, SearchDefinition, SyncStrategy};
use crate::store::DefinitionStore;
use crate::{LiveAlbumError, Result};
use bridge_traits::catalog::{AssetCatalog, AssetId, BulkOutcome, CollectionId};
use bridge_traits::time::Clock;
use core_runtime::config::LiveAlbumConfig;
use core_runtime::events::{CoreEvent, EventBus, ReconcileEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Options & Outcome
// ============================================================================

/// Per-run overrides for a refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshOptions {
    /// Compute and report the delta without mutating anything
    pub dry_run: bool,
    /// One-shot search page size (still clamped to the ceiling)
    pub max_results: Option<u32>,
    /// Number of ids to include in previews
    pub preview_limit: Option<usize>,
}

impl RefreshOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }
}

/// Overall result of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    /// Destination already matched the search
    NoChange,
    /// Every planned change was applied
    Applied,
    /// Some ids failed to add or remove
    PartialFailure,
    /// Nothing was mutated; counts and previews only
    DryRun,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::NoChange => "no-change",
            OutcomeStatus::Applied => "applied",
            OutcomeStatus::PartialFailure => "partial-failure",
            OutcomeStatus::DryRun => "dry-run",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub definition_id: DefinitionId,
    pub collection_id: CollectionId,
    pub status: OutcomeStatus,
    /// Distinct ids returned by the search
    pub result_count: usize,
    /// Planned additions
    pub to_add: usize,
    /// Planned removals (always zero for add-only)
    pub to_remove: usize,
    pub added: Vec<AssetId>,
    pub failed_to_add: Vec<AssetId>,
    pub removed: Vec<AssetId>,
    pub failed_to_remove: Vec<AssetId>,
    pub preview_add: Vec<AssetId>,
    pub preview_remove: Vec<AssetId>,
    /// Bulk calls that errored outright
    pub apply_errors: Vec<String>,
    /// Set when the changes were applied but the run could not be recorded
    pub persist_error: Option<String>,
}

impl ReconcileOutcome {
    /// Assets whose membership actually changed
    pub fn moved_count(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_to_add.len() + self.failed_to_remove.len()
    }

    pub fn is_partial(&self) -> bool {
        self.status == OutcomeStatus::PartialFailure
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Membership delta between a target set and the current contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_add: Vec<AssetId>,
    pub to_remove: Vec<AssetId>,
}

impl ReconcilePlan {
    /// `to_add = target − current`; for full-sync also `to_remove = current − target`.
    ///
    /// `target` order is preserved; duplicates must already be collapsed.
    pub fn compute(target: &[AssetId], current: &[AssetId], strategy: SyncStrategy) -> Self {
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
        let to_add = target
            .iter()
            .filter(|id| !current_set.contains(id.as_str()))
            .cloned()
            .collect();

        let to_remove = if strategy.removes() {
            let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();
            let mut seen = HashSet::new();
            current
                .iter()
                .filter(|id| !target_set.contains(id.as_str()) && seen.insert(id.as_str()))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Collapse duplicate ids, keeping the first occurrence
pub fn dedupe(ids: Vec<AssetId>) -> Vec<AssetId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

// ============================================================================
// Reconciler
// ============================================================================

/// Settings the reconciler takes from [`LiveAlbumConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub max_results_ceiling: u32,
    pub preview_limit: usize,
    pub call_timeout: Duration,
}

impl From<&LiveAlbumConfig> for ReconcilerSettings {
    fn from(config: &LiveAlbumConfig) -> Self {
        Self {
            max_results_ceiling: config.max_results_ceiling,
            preview_limit: config.preview_limit,
            call_timeout: config.call_timeout,
        }
    }
}

/// Stateless diff-and-apply engine for a single definition
pub struct Reconciler {
    catalog: Arc<dyn AssetCatalog>,
    store: Arc<DefinitionStore>,
    embedded: EmbeddedCarrier,
    clock: Arc<dyn Clock>,
    settings: ReconcilerSettings,
    event_bus: Option<EventBus>,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn AssetCatalog>,
        store: Arc<DefinitionStore>,
        clock: Arc<dyn Clock>,
        settings: ReconcilerSettings,
    ) -> Self {
        let embedded = EmbeddedCarrier::new(catalog.clone(), clock.clone(), settings.call_timeout);
        Self {
            catalog,
            store,
            embedded,
            clock,
            settings,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// - `InvalidDefinition` for a zero one-shot `max_results`
    /// - `DestinationUnresolved`, `SearchFailed`, `FetchCurrentFailed` when the
    ///   run aborts before mutating; these are recorded on the definition
    ///   unless this is a dry run
    /// - `RunNotRecorded` wrapping one of the above when recording it failed
    ///
    /// Partial bulk failures and failures to record the run are reported in
    /// the returned [`ReconcileOutcome`] instead.
    #[instrument(
        skip(self, definition, options),
        fields(definition_id = %definition.id, name = %definition.name, dry_run = options.dry_run)
    )]
    pub async fn reconcile(
        &self,
        definition: &SearchDefinition,
        options: &RefreshOptions,
    ) -> Result<ReconcileOutcome> {
        match self.run(definition, options).await {
            Ok(outcome) => {
                self.emit(CoreEvent::Reconcile(ReconcileEvent::Completed {
                    definition_id: definition.id.to_string(),
                    collection_id: outcome.collection_id.clone(),
                    status: outcome.status.as_str().to_string(),
                    added: outcome.added.len() as u64,
                    removed: outcome.removed.len() as u64,
                    failed: outcome.failed_count() as u64,
                }));
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed");
                self.emit(CoreEvent::Reconcile(ReconcileEvent::Failed {
                    definition_id: definition.id.to_string(),
                    kind: e.kind().as_str().to_string(),
                    message: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        definition: &SearchDefinition,
        options: &RefreshOptions,
    ) -> Result<ReconcileOutcome> {
        let max_results = self.effective_max_results(definition, options)?;
        let preview_limit = options.preview_limit.unwrap_or(self.settings.preview_limit);

        let collection_id = match self.resolve_destination(definition).await {
            Ok(id) => id,
            Err(message) => {
                let err = LiveAlbumError::DestinationUnresolved(definition.name.clone());
                let note = format!("{}: {}", err, message);
                return Err(self.abort(definition, options, err, note).await);
            }
        };

        let results = match bounded(
            self.settings.call_timeout,
            self.catalog.search(&definition.search, max_results),
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                let err = LiveAlbumError::SearchFailed(e.to_string());
                let note = err.to_string();
                return Err(self.abort(definition, options, err, note).await);
            }
        };

        let current = match bounded(
            self.settings.call_timeout,
            self.catalog.collection_contents(&collection_id),
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                let err = LiveAlbumError::FetchCurrentFailed {
                    collection_id: collection_id.clone(),
                    message: e.to_string(),
                };
                let note = err.to_string();
                return Err(self.abort(definition, options, err, note).await);
            }
        };

        let target = dedupe(results);
        let plan = ReconcilePlan::compute(&target, &current, definition.sync_strategy);
        debug!(
            collection_id = %collection_id,
            result_count = target.len(),
            current = current.len(),
            to_add = plan.to_add.len(),
            to_remove = plan.to_remove.len(),
            "Computed reconciliation plan"
        );

        let mut outcome = ReconcileOutcome {
            definition_id: definition.id,
            collection_id: collection_id.clone(),
            status: OutcomeStatus::NoChange,
            result_count: target.len(),
            to_add: plan.to_add.len(),
            to_remove: plan.to_remove.len(),
            added: Vec::new(),
            failed_to_add: Vec::new(),
            removed: Vec::new(),
            failed_to_remove: Vec::new(),
            preview_add: plan.to_add.iter().take(preview_limit).cloned().collect(),
            preview_remove: plan.to_remove.iter().take(preview_limit).cloned().collect(),
            apply_errors: Vec::new(),
            persist_error: None,
        };

        if options.dry_run {
            outcome.status = OutcomeStatus::DryRun;
            info!(
                to_add = outcome.to_add,
                to_remove = outcome.to_remove,
                "Dry run complete"
            );
            return Ok(outcome);
        }

        // Additions first; removals never roll them back.
        if !plan.to_add.is_empty() {
            let applied = self
                .apply("add", &collection_id, &plan.to_add, &mut outcome.apply_errors)
                .await;
            outcome.added = applied.succeeded;
            outcome.failed_to_add = applied.failed;
        }

        if !plan.to_remove.is_empty() {
            let applied = self
                .apply("remove", &collection_id, &plan.to_remove, &mut outcome.apply_errors)
                .await;
            outcome.removed = applied.succeeded;
            outcome.failed_to_remove = applied.failed;
        }

        outcome.status = if outcome.failed_count() > 0 {
            OutcomeStatus::PartialFailure
        } else if plan.is_empty() {
            OutcomeStatus::NoChange
        } else {
            OutcomeStatus::Applied
        };

        let stats = RunStats {
            last_result_count: outcome.result_count as u64,
            last_added_count: outcome.added.len() as u64,
            last_removed_count: outcome.removed.len() as u64,
            last_failed_count: outcome.failed_count() as u64,
            last_run_error: partial_failure_note(&outcome),
        };

        if let Err(e) = self.persist_run(definition, stats).await {
            warn!(error = %e, "Changes applied but run statistics were not recorded");
            outcome.persist_error = Some(e.to_string());
        }

        if outcome.is_partial() {
            warn!(
                collection_id = %collection_id,
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                failed = outcome.failed_count(),
                "Reconciliation completed with failures"
            );
        } else {
            info!(
                collection_id = %collection_id,
                status = %outcome.status,
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                "Reconciliation completed"
            );
        }

        Ok(outcome)
    }

    fn effective_max_results(
        &self,
        definition: &SearchDefinition,
        options: &RefreshOptions,
    ) -> Result<u32> {
        let requested = options.max_results.unwrap_or(definition.max_results);
        if requested == 0 {
            return Err(LiveAlbumError::InvalidDefinition(
                "max_results must be greater than zero".to_string(),
            ));
        }
        Ok(requested.min(self.settings.max_results_ceiling))
    }

    /// Destination id, looked up by name when only a name is known
    async fn resolve_destination(&self, definition: &SearchDefinition) -> std::result::Result<CollectionId, String> {
        if let Some(id) = definition
            .destination_collection_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            return Ok(id.to_string());
        }

        let Some(name) = definition
            .destination_collection_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
        else {
            return Err("no destination collection id or name".to_string());
        };

        match bounded(
            self.settings.call_timeout,
            self.catalog.find_collection_by_name(name),
        )
        .await
        {
            Ok(Some(collection)) => Ok(collection.id),
            Ok(None) => Err(format!("no collection named '{}'", name)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Run one bulk phase; an outright call failure marks every id failed
    async fn apply(
        &self,
        operation: &'static str,
        collection_id: &str,
        ids: &[AssetId],
        errors: &mut Vec<String>,
    ) -> BulkOutcome {
        let call = async {
            if operation == "add" {
                self.catalog.bulk_add(collection_id, ids).await
            } else {
                self.catalog.bulk_remove(collection_id, ids).await
            }
        };

        match bounded(self.settings.call_timeout, call).await {
            Ok(outcome) => account_for_all(ids, outcome),
            Err(e) => {
                warn!(operation, count = ids.len(), error = %e, "Bulk call failed");
                errors.push(format!("bulk {} failed: {}", operation, e));
                BulkOutcome::all_failed(ids)
            }
        }
    }

    /// Record an aborted run unless this is a dry run.
    ///
    /// A failed bookkeeping write is folded into the returned error so the
    /// caller can count it.
    async fn abort(
        &self,
        definition: &SearchDefinition,
        options: &RefreshOptions,
        err: LiveAlbumError,
        note: String,
    ) -> LiveAlbumError {
        if options.dry_run {
            return err;
        }
        match self.persist_run(definition, RunStats::failed(note)).await {
            Ok(()) => err,
            Err(persist) => {
                warn!(error = %persist, "Failed to record aborted run");
                LiveAlbumError::RunNotRecorded {
                    error: Box::new(err),
                    persist_error: persist.to_string(),
                }
            }
        }
    }

    /// Write `last_run_at` and stats back through the definition's carrier.
    ///
    /// Only the run fields change. An embedded definition is merged into the
    /// collection's current metadata, so edits made since the run started
    /// survive; if the collection no longer carries it nothing is written.
    async fn persist_run(&self, definition: &SearchDefinition, stats: RunStats) -> Result<()> {
        let now = self.clock.now();
        match definition.source {
            DefinitionSource::Store => {
                self.store.record_run(definition.id, now, stats).await?;
            }
            DefinitionSource::Embedded => {
                let collection_id = definition
                    .destination_collection_id
                    .as_deref()
                    .ok_or_else(|| LiveAlbumError::DestinationUnresolved(definition.name.clone()))?;
                let recorded = self
                    .embedded
                    .record_run(collection_id, definition.id, now, stats)
                    .await?;
                if !recorded {
                    debug!(collection_id, "Collection is no longer live; run not recorded");
                }
            }
        }
        Ok(())
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

/// Requested ids the catalog reported neither way count as failed
fn account_for_all(requested: &[AssetId], mut outcome: BulkOutcome) -> BulkOutcome {
    let reported: HashSet<&str> = outcome
        .succeeded
        .iter()
        .chain(outcome.failed.iter())
        .map(String::as_str)
        .collect();
    let missing: Vec<AssetId> = requested
        .iter()
        .filter(|id| !reported.contains(id.as_str()))
        .cloned()
        .collect();
    outcome.failed.extend(missing);
    outcome
}

fn partial_failure_note(outcome: &ReconcileOutcome) -> String {
    let mut notes = Vec::new();
    if !outcome.failed_to_add.is_empty() {
        notes.push(
            LiveAlbumError::PartialApplyFailure {
                operation: "add",
                failed: outcome.failed_to_add.len(),
            }
            .to_string(),
        );
    }
    if !outcome.failed_to_remove.is_empty() {
        notes.push(
            LiveAlbumError::PartialApplyFailure {
                operation: "remove",
                failed: outcome.failed_to_remove.len(),
            }
            .to_string(),
        );
    }
    notes.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<AssetId> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        assert_eq!(
            dedupe(ids(&["b", "a", "b", "c", "a"])),
            ids(&["b", "a", "c"])
        );
    }

    #[test]
    fn test_plan_full_sync() {
        let plan = ReconcilePlan::compute(
            &ids(&["B", "C", "D"]),
            &ids(&["A", "B", "C"]),
            SyncStrategy::FullSync,
        );
        assert_eq!(plan.to_add, ids(&["D"]));
        assert_eq!(plan.to_remove, ids(&["A"]));
    }

    #[test]
    fn test_plan_add_only_never_removes() {
        let plan = ReconcilePlan::compute(&ids(&["B"]), &ids(&["A", "B", "C"]), SyncStrategy::AddOnly);
        assert!(plan.to_add.is_empty());
        assert!(plan.to_remove.is_empty());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_is_exact_set_difference() {
        // Small exhaustive check over subsets of a four-element universe.
        let universe = ["a", "b", "c", "d"];
        let subset = |mask: u8| -> Vec<AssetId> {
            universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s.to_string())
                .collect()
        };

        for t in 0u8..16 {
            for c in 0u8..16 {
                let target = subset(t);
                let current = subset(c);
                let plan = ReconcilePlan::compute(&target, &current, SyncStrategy::FullSync);
                assert_eq!(plan.to_add, subset(t & !c));
                assert_eq!(plan.to_remove, subset(c & !t));
            }
        }
    }

    #[test]
    fn test_unreported_ids_count_as_failed() {
        let outcome = account_for_all(
            &ids(&["a", "b", "c"]),
            BulkOutcome {
                succeeded: ids(&["a"]),
                failed: ids(&["b"]),
            },
        );
        assert_eq!(outcome.failed, ids(&["b", "c"]));
    }

    #[test]
    fn test_outcome_counts() {
        let outcome = ReconcileOutcome {
            definition_id: DefinitionId::new(),
            collection_id: "c".to_string(),
            status: OutcomeStatus::PartialFailure,
            result_count: 3,
            to_add: 3,
            to_remove: 1,
            added: ids(&["a", "b"]),
            failed_to_add: ids(&["c"]),
            removed: ids(&["z"]),
            failed_to_remove: Vec::new(),
            preview_add: Vec::new(),
            preview_remove: Vec::new(),
            apply_errors: Vec::new(),
            persist_error: None,
        };
        assert_eq!(outcome.moved_count(), 3);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(partial_failure_note(&outcome), "1 asset(s) failed to add");
    }
}
