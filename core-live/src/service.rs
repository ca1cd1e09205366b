//! # Live Album Service
//!
//! Caller-facing façade over the store, codec, reconciler and scheduler.
//!
//! ## Usage
//!
//! ```ignore
//! use core_live::{DefineRequest, DefinitionSelector, LiveAlbumService, RefreshOptions};
//!
//! let service = LiveAlbumService::new(deps, config).await?;
//!
//! let definition = service
//!     .define(DefineRequest::smart("Beach days", "beach at sunset"))
//!     .await?;
//!
//! let preview = service
//!     .refresh(DefinitionSelector::Id(definition.id), RefreshOptions::dry_run())
//!     .await?;
//! println!("would add {} assets", preview.to_add);
//!
//! service.start_scheduler().await?;
//! ```

use crate::carrier::{bounded, EmbeddedCarrier};
use crate::codec;
use crate::definition::{
    normalize_name, DefinitionId, DefinitionSource, SearchDefinition, SyncStrategy,
};
use crate::reconciler::{ReconcileOutcome, Reconciler, ReconcilerSettings, RefreshOptions};
use crate::scheduler::{Scheduler, SchedulerSettings, SchedulerStatus, SweepReport};
use crate::store::{DefinitionStore, STORE_FILE_NAME};
use crate::{LiveAlbumError, Result};
use bridge_traits::catalog::{AssetCatalog, CollectionId, CollectionSummary, SearchSpec};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::{Clock, TickSource};
use core_runtime::config::LiveAlbumConfig;
use core_runtime::events::{CoreEvent, DefinitionEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Collaborators the service is built from
#[derive(Clone)]
pub struct LiveAlbumDependencies {
    pub catalog: Arc<dyn AssetCatalog>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
    pub tick_source: Arc<dyn TickSource>,
    pub event_bus: EventBus,
}

/// Request to create or redefine a live album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
    /// Destination name; defaults to the definition name
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default = "create_by_default")]
    pub create_if_missing: bool,
    pub search: SearchSpec,
    #[serde(default)]
    pub max_results: Option<u32>,
    #[serde(default)]
    pub sync_strategy: SyncStrategy,
    /// `None` keeps the current value on redefinition, else enabled
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn create_by_default() -> bool {
    true
}

impl DefineRequest {
    pub fn new(name: impl Into<String>, search: SearchSpec) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            collection_id: None,
            collection_name: None,
            create_if_missing: true,
            search,
            max_results: None,
            sync_strategy: SyncStrategy::AddOnly,
            enabled: None,
        }
    }

    /// Free-text live album
    pub fn smart(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(name, SearchSpec::smart(query))
    }

    pub fn with_collection_id(mut self, collection_id: impl Into<CollectionId>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn without_create(mut self) -> Self {
        self.create_if_missing = false;
        self
    }

    fn destination_name(&self) -> &str {
        self.collection_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.trim())
    }
}

/// How a caller names a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum DefinitionSelector {
    Id(DefinitionId),
    /// Case-insensitive name
    Name(String),
    /// Destination collection id
    Collection(CollectionId),
}

impl std::fmt::Display for DefinitionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionSelector::Id(id) => write!(f, "id {}", id),
            DefinitionSelector::Name(name) => write!(f, "name '{}'", name),
            DefinitionSelector::Collection(id) => write!(f, "collection {}", id),
        }
    }
}

/// Live album engine façade
pub struct LiveAlbumService {
    catalog: Arc<dyn AssetCatalog>,
    store: Arc<DefinitionStore>,
    embedded: EmbeddedCarrier,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    config: LiveAlbumConfig,
    event_bus: EventBus,
}

impl LiveAlbumService {
    /// Open the definition store and wire the engine.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid configuration and `PersistenceFailed`
    /// if an existing store file cannot be loaded.
    pub async fn new(deps: LiveAlbumDependencies, config: LiveAlbumConfig) -> Result<Self> {
        config.validate()?;

        let store_path = match &config.store_path {
            Some(path) => path.clone(),
            None => deps
                .file_system
                .get_data_directory()
                .await
                .map_err(|e| LiveAlbumError::PersistenceFailed(e.to_string()))?
                .join(STORE_FILE_NAME),
        };

        let store = Arc::new(
            DefinitionStore::open(deps.file_system.clone(), deps.clock.clone(), store_path).await?,
        );
        let embedded =
            EmbeddedCarrier::new(deps.catalog.clone(), deps.clock.clone(), config.call_timeout);
        let reconciler = Arc::new(
            Reconciler::new(
                deps.catalog.clone(),
                store.clone(),
                deps.clock.clone(),
                ReconcilerSettings::from(&config),
            )
            .with_event_bus(deps.event_bus.clone()),
        );
        let scheduler = Scheduler::new(
            reconciler,
            store.clone(),
            embedded.clone(),
            deps.clock.clone(),
            deps.tick_source.clone(),
            SchedulerSettings {
                enabled: config.scheduler_enabled,
                interval: config.sweep_interval,
            },
            Some(deps.event_bus.clone()),
        );

        Ok(Self {
            catalog: deps.catalog,
            store,
            embedded,
            scheduler,
            clock: deps.clock,
            config,
            event_bus: deps.event_bus,
        })
    }

    pub fn config(&self) -> &LiveAlbumConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn store(&self) -> &Arc<DefinitionStore> {
        &self.store
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    /// Create or redefine a stored definition.
    ///
    /// A request whose name matches an existing stored definition replaces
    /// its configuration but keeps its id and run history. The destination
    /// is resolved by id, then by name, then created when allowed; if none
    /// of that applies the name is kept for resolution at run time.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn define(&self, request: DefineRequest) -> Result<SearchDefinition> {
        let mut definition = self.build_definition(&request)?;

        let mut kept_destination = false;
        match self.store.get_by_name(&request.name).await {
            Ok(existing) => {
                debug!(definition_id = %existing.id, "Redefining existing definition");
                definition.id = existing.id;
                definition.last_run_at = existing.last_run_at;
                definition.stats = existing.stats;
                if request.enabled.is_none() {
                    definition.enabled = existing.enabled;
                }

                // No destination in the request: keep the one already linked.
                if request.collection_id.is_none()
                    && request.collection_name.is_none()
                    && existing.destination_collection_id.is_some()
                {
                    definition.destination_collection_id = existing.destination_collection_id;
                    definition.destination_collection_name = existing.destination_collection_name;
                    kept_destination = true;
                }
            }
            Err(LiveAlbumError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        if !kept_destination {
            if let Some(collection) = self.resolve_collection(&request).await? {
                definition.destination_collection_id = Some(collection.id);
                definition.destination_collection_name = Some(collection.name);
            }
        }

        let saved = self.store.save(definition).await?;
        info!(definition_id = %saved.id, destination = %saved.destination_label(), "Definition saved");
        self.emit_saved(&saved);
        Ok(saved)
    }

    /// Create a live album whose definition is embedded in the collection
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_live_album(&self, request: DefineRequest) -> Result<SearchDefinition> {
        let definition = self.build_definition(&request)?;
        let collection = self
            .resolve_collection(&request)
            .await?
            .ok_or_else(|| LiveAlbumError::DestinationUnresolved(request.name.clone()))?;

        self.embed(definition, collection, request.enabled).await
    }

    /// Turn an existing collection into a live album.
    ///
    /// The collection's current plain description is preserved inside the
    /// metadata; an empty request name means "use the collection name".
    #[instrument(skip(self, collection_id, request), fields(collection_id = %collection_id))]
    pub async fn convert_collection(
        &self,
        collection_id: &str,
        request: DefineRequest,
    ) -> Result<SearchDefinition> {
        let collection = self.collection_by_id(collection_id).await?;

        let mut request = request;
        if request.name.trim().is_empty() {
            request.name = collection.name.clone();
        }
        if request.description.is_empty() && !codec::is_live(&collection.description) {
            request.description = collection.description.clone();
        }

        let definition = self.build_definition(&request)?;
        self.embed(definition, collection, request.enabled).await
    }

    /// Remove embedded metadata, restoring the plain description.
    ///
    /// The collection and its assets are left untouched.
    #[instrument(skip(self))]
    pub async fn unlink_live_album(&self, collection_id: &str) -> Result<()> {
        let _gate = self.scheduler.exclusive().await;
        let definition = self.embedded.clear(collection_id).await?;
        info!(definition_id = %definition.id, "Live album unlinked");
        self.emit(CoreEvent::Definition(DefinitionEvent::Unlinked {
            collection_id: collection_id.to_string(),
        }));
        Ok(())
    }

    /// Delete a stored definition. The destination collection is kept.
    pub async fn delete(&self, id: &DefinitionId) -> Result<SearchDefinition> {
        let removed = self.store.delete(id).await?;
        self.emit(CoreEvent::Definition(DefinitionEvent::Deleted {
            definition_id: removed.id.to_string(),
            name: removed.name.clone(),
        }));
        Ok(removed)
    }

    /// Every definition from both carriers, with last-run statistics
    pub async fn list(&self) -> Result<Vec<SearchDefinition>> {
        let mut definitions = self.embedded.discover().await?;
        definitions.extend(self.store.list().await);
        definitions.sort_by_cached_key(SearchDefinition::sort_key);
        Ok(definitions)
    }

    /// Look up one definition in either carrier
    pub async fn get(&self, selector: &DefinitionSelector) -> Result<SearchDefinition> {
        match selector {
            DefinitionSelector::Id(id) => match self.store.get_by_id(id).await {
                Ok(found) => Ok(found),
                Err(LiveAlbumError::NotFound { .. }) => self
                    .embedded
                    .discover()
                    .await?
                    .into_iter()
                    .find(|d| d.id == *id)
                    .ok_or_else(|| LiveAlbumError::not_found("Definition", id.to_string())),
                Err(e) => Err(e),
            },
            DefinitionSelector::Name(name) => match self.store.get_by_name(name).await {
                Ok(found) => Ok(found),
                Err(LiveAlbumError::NotFound { .. }) => {
                    let wanted = normalize_name(name);
                    self.embedded
                        .discover()
                        .await?
                        .into_iter()
                        .find(|d| d.name_key() == wanted)
                        .ok_or_else(|| LiveAlbumError::not_found("Definition", name.clone()))
                }
                Err(e) => Err(e),
            },
            DefinitionSelector::Collection(collection_id) => {
                if let Some(found) = self.embedded.load(collection_id, "").await? {
                    return Ok(self.with_collection_name(found).await);
                }
                self.store
                    .list()
                    .await
                    .into_iter()
                    .find(|d| d.destination_collection_id.as_deref() == Some(collection_id.as_str()))
                    .ok_or_else(|| LiveAlbumError::not_found("Live album for collection", collection_id.clone()))
            }
        }
    }

    /// Enable or disable scheduled runs for a definition
    pub async fn set_enabled(
        &self,
        selector: &DefinitionSelector,
        enabled: bool,
    ) -> Result<SearchDefinition> {
        let mut definition = self.get(selector).await?;

        let updated = match definition.source {
            DefinitionSource::Store => {
                definition.enabled = enabled;
                self.store.save(definition).await?
            }
            DefinitionSource::Embedded => {
                // Re-read under the gate so a sweep's run stats are kept.
                let _gate = self.scheduler.exclusive().await;
                let mut current = self.reload_embedded(&definition).await?;
                current.enabled = enabled;
                current.updated_at = self.clock.now();
                self.embedded.write(&current).await?;
                current
            }
        };

        info!(definition_id = %updated.id, enabled, "Definition toggled");
        self.emit_saved(&updated);
        Ok(updated)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile one definition now.
    ///
    /// Runs regardless of `enabled`, and never concurrently with a sweep.
    #[instrument(skip(self, selector, options), fields(selector = %selector))]
    pub async fn refresh(
        &self,
        selector: DefinitionSelector,
        options: RefreshOptions,
    ) -> Result<ReconcileOutcome> {
        if options.max_results == Some(0) {
            return Err(LiveAlbumError::InvalidDefinition(
                "max_results override must be greater than zero".to_string(),
            ));
        }
        if options.preview_limit == Some(0) {
            return Err(LiveAlbumError::InvalidDefinition(
                "preview limit must be at least 1".to_string(),
            ));
        }

        let definition = self.get(&selector).await?;
        self.scheduler.run_one(&definition, &options).await
    }

    pub async fn start_scheduler(&self) -> Result<()> {
        self.scheduler.start().await
    }

    pub async fn stop_scheduler(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    pub async fn run_now(&self) -> SweepReport {
        self.scheduler.run_now().await
    }

    /// Stop the scheduler, cancelling a sweep at the next definition boundary
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown().await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn build_definition(&self, request: &DefineRequest) -> Result<SearchDefinition> {
        if request.name.trim().is_empty() {
            return Err(LiveAlbumError::InvalidDefinition(
                "name cannot be empty".to_string(),
            ));
        }

        let mut definition = SearchDefinition::new(
            request.name.trim(),
            request.search.clone(),
            request.max_results.unwrap_or(self.config.default_max_results),
        )
        .with_description(request.description.clone())
        .with_strategy(request.sync_strategy)
        .with_enabled(request.enabled.unwrap_or(true))
        .with_destination_name(request.destination_name());

        if let Some(id) = request.collection_id.as_deref().filter(|id| !id.trim().is_empty()) {
            definition = definition.with_destination_id(id.trim());
        }

        codec::validate(&mut definition, self.config.max_results_ceiling)?;
        Ok(definition)
    }

    /// Destination by id, then by name, then newly created
    async fn resolve_collection(&self, request: &DefineRequest) -> Result<Option<CollectionSummary>> {
        if let Some(id) = request.collection_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return self.collection_by_id(id.trim()).await.map(Some);
        }

        let name = request.destination_name();
        if let Some(found) = bounded(
            self.config.call_timeout,
            self.catalog.find_collection_by_name(name),
        )
        .await?
        {
            return Ok(Some(found));
        }

        if !request.create_if_missing {
            debug!(collection_name = name, "Destination not found; resolving at run time");
            return Ok(None);
        }

        let id = bounded(
            self.config.call_timeout,
            self.catalog.create_collection(name, &request.description),
        )
        .await?;
        info!(collection_id = %id, collection_name = name, "Created destination collection");

        Ok(Some(CollectionSummary {
            id,
            name: name.to_string(),
            description: request.description.clone(),
            asset_count: 0,
        }))
    }

    async fn collection_by_id(&self, collection_id: &str) -> Result<CollectionSummary> {
        bounded(self.config.call_timeout, self.catalog.list_collections())
            .await?
            .into_iter()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| LiveAlbumError::not_found("Collection", collection_id))
    }

    async fn with_collection_name(&self, mut definition: SearchDefinition) -> SearchDefinition {
        if let Some(id) = definition.destination_collection_id.clone() {
            if let Ok(collection) = self.collection_by_id(&id).await {
                if definition.name.is_empty() {
                    definition.name = collection.name.clone();
                }
                definition.destination_collection_name = Some(collection.name);
            }
        }
        definition
    }

    /// Current embedded state of a definition read earlier
    async fn reload_embedded(&self, definition: &SearchDefinition) -> Result<SearchDefinition> {
        let collection_id = definition
            .destination_collection_id
            .as_deref()
            .ok_or_else(|| LiveAlbumError::DestinationUnresolved(definition.name.clone()))?;
        let collection_name = definition.destination_collection_name.as_deref().unwrap_or("");

        self.embedded
            .load(collection_id, collection_name)
            .await?
            .ok_or(LiveAlbumError::NotLive)
    }

    /// Embed a definition into a collection, keeping an existing id and history.
    ///
    /// Runs under the sweep gate and re-reads the description there, so run
    /// statistics written by a sweep are not lost.
    async fn embed(
        &self,
        mut definition: SearchDefinition,
        collection: CollectionSummary,
        enabled: Option<bool>,
    ) -> Result<SearchDefinition> {
        let _gate = self.scheduler.exclusive().await;
        let description = bounded(
            self.config.call_timeout,
            self.catalog.collection_description(&collection.id),
        )
        .await?;

        let now = self.clock.now();
        definition.source = DefinitionSource::Embedded;
        definition.destination_collection_id = Some(collection.id.clone());
        definition.destination_collection_name = Some(collection.name.clone());
        definition.id = DefinitionId::for_collection(&collection.id);
        definition.created_at = now;
        definition.updated_at = now;

        if let Ok(metadata) = codec::decode(&description) {
            let previous = metadata.into_definition(&collection.id, &collection.name, now);
            if enabled.is_none() {
                definition.enabled = previous.enabled;
            }
            definition.id = previous.id;
            definition.created_at = previous.created_at;
            definition.last_run_at = previous.last_run_at;
            definition.stats = previous.stats;
            if definition.description.is_empty() {
                definition.description = previous.description;
            }
        }

        self.embedded.write(&definition).await?;
        info!(
            definition_id = %definition.id,
            collection_id = %collection.id,
            "Live album metadata written"
        );
        self.emit_saved(&definition);
        Ok(definition)
    }

    fn emit_saved(&self, definition: &SearchDefinition) {
        self.emit(CoreEvent::Definition(DefinitionEvent::Saved {
            definition_id: definition.id.to_string(),
            name: definition.name.clone(),
            source: definition.source.as_str().to_string(),
        }));
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }
}
