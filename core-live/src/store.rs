//! # Definition Store
//!
//! Durable keyed storage for [`SearchDefinition`] records.
//!
//! ## Overview
//!
//! The whole record set lives in memory behind a single `RwLock` and is
//! written back as one JSON array on every mutation through
//! [`FileSystemAccess::write_file_atomic`]. A mutation is staged on a copy of
//! the table and only committed to memory once the write succeeded, so a
//! failed save leaves both the file and the in-memory view untouched.
//!
//! ## Name Index
//!
//! Names are unique case-insensitively: the secondary index maps each
//! normalized name to exactly one id, and the most recent save wins. Older
//! records that lost their name entry remain reachable by id.

use crate::definition::{normalize_name, DefinitionId, DefinitionSource, RunStats, SearchDefinition};
use crate::{LiveAlbumError, Result};
use bridge_traits::{storage::FileSystemAccess, time::Clock};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Default file name inside the data directory
pub const STORE_FILE_NAME: &str = "definitions.json";

#[derive(Debug, Clone, Default)]
struct StoreState {
    by_id: BTreeMap<DefinitionId, SearchDefinition>,
    by_name: HashMap<String, DefinitionId>,
}

impl StoreState {
    fn from_records(records: Vec<SearchDefinition>) -> Self {
        let mut state = StoreState::default();

        for mut record in records {
            record.source = DefinitionSource::Store;
            let key = record.name_key();
            let id = record.id;

            if !key.is_empty() {
                let newer = match state.by_name.get(&key).and_then(|i| state.by_id.get(i)) {
                    Some(holder) => {
                        (record.updated_at, record.id) > (holder.updated_at, holder.id)
                    }
                    None => true,
                };
                if newer {
                    state.by_name.insert(key, id);
                }
            }
            state.by_id.insert(id, record);
        }

        state
    }

    fn upsert(&mut self, record: SearchDefinition) {
        let id = record.id;
        let key = record.name_key();

        if let Some(previous) = self.by_id.get(&id) {
            let old_key = previous.name_key();
            if old_key != key {
                self.release_name(&old_key, id);
            }
        }

        if !key.is_empty() {
            self.by_name.insert(key, id);
        }
        self.by_id.insert(id, record);
    }

    fn remove(&mut self, id: DefinitionId) -> Option<SearchDefinition> {
        let removed = self.by_id.remove(&id)?;
        self.release_name(&removed.name_key(), id);
        Some(removed)
    }

    /// Drop a name entry, but only while it still points at `id`
    fn release_name(&mut self, key: &str, id: DefinitionId) {
        if self.by_name.get(key) == Some(&id) {
            self.by_name.remove(key);
        }
    }
}

/// Store of search definitions persisted to a single JSON file
pub struct DefinitionStore {
    file_system: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl DefinitionStore {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing or empty file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailed` if the file cannot be read or parsed.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(
        file_system: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        path: PathBuf,
    ) -> Result<Self> {
        let records = Self::load(file_system.as_ref(), &path).await?;
        let count = records.len();
        let state = StoreState::from_records(records);
        info!(count, "Opened definition store");

        Ok(Self {
            file_system,
            clock,
            path,
            state: RwLock::new(state),
        })
    }

    async fn load(file_system: &dyn FileSystemAccess, path: &Path) -> Result<Vec<SearchDefinition>> {
        let exists = file_system
            .exists(path)
            .await
            .map_err(|e| LiveAlbumError::PersistenceFailed(e.to_string()))?;
        if !exists {
            debug!("No definition store file yet");
            return Ok(Vec::new());
        }

        let data = file_system
            .read_file(path)
            .await
            .map_err(|e| LiveAlbumError::PersistenceFailed(e.to_string()))?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|e| {
            LiveAlbumError::PersistenceFailed(format!(
                "definition store {} is corrupt: {}",
                path.display(),
                e
            ))
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a definition.
    ///
    /// `created_at` is kept from the stored record when the id already
    /// exists and set to now otherwise; `updated_at` is always now.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailed` if the file could not be written. The
    /// save did not take effect in that case.
    #[instrument(skip(self, definition), fields(definition_id = %definition.id, name = %definition.name))]
    pub async fn save(&self, definition: SearchDefinition) -> Result<SearchDefinition> {
        let mut state = self.state.write().await;
        let now = self.clock.now();

        let mut record = definition;
        record.source = DefinitionSource::Store;
        record.created_at = state
            .by_id
            .get(&record.id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        record.updated_at = now;

        let mut staged = state.clone();
        staged.upsert(record.clone());
        self.persist(&staged).await?;
        *state = staged;

        debug!("Saved definition");
        Ok(record)
    }

    /// Record the outcome of a reconciliation run.
    ///
    /// Only `last_run_at` and the run statistics change, so a definition
    /// edited while it was being reconciled keeps the edit.
    #[instrument(skip(self, at, stats), fields(definition_id = %id))]
    pub async fn record_run(
        &self,
        id: DefinitionId,
        at: DateTime<Utc>,
        stats: RunStats,
    ) -> Result<SearchDefinition> {
        let mut state = self.state.write().await;

        let mut record = state
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| LiveAlbumError::not_found("Definition", id.to_string()))?;
        record.record_run(at, stats);

        let mut staged = state.clone();
        staged.upsert(record.clone());
        self.persist(&staged).await?;
        *state = staged;

        Ok(record)
    }

    /// Look up a definition by id
    pub async fn get_by_id(&self, id: &DefinitionId) -> Result<SearchDefinition> {
        self.state
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| LiveAlbumError::not_found("Definition", id.to_string()))
    }

    /// Look up a definition by name (case-insensitive)
    pub async fn get_by_name(&self, name: &str) -> Result<SearchDefinition> {
        let state = self.state.read().await;
        state
            .by_name
            .get(&normalize_name(name))
            .and_then(|id| state.by_id.get(id))
            .cloned()
            .ok_or_else(|| LiveAlbumError::not_found("Definition", name))
    }

    /// All definitions, sorted by name (case-insensitive) then id
    pub async fn list(&self) -> Vec<SearchDefinition> {
        let mut records: Vec<SearchDefinition> =
            self.state.read().await.by_id.values().cloned().collect();
        records.sort_by_cached_key(SearchDefinition::sort_key);
        records
    }

    /// Number of stored definitions
    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete a definition, returning the removed record
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `PersistenceFailed` if the
    /// file could not be written (the record is then still present).
    #[instrument(skip(self), fields(definition_id = %id))]
    pub async fn delete(&self, id: &DefinitionId) -> Result<SearchDefinition> {
        let mut state = self.state.write().await;

        let mut staged = state.clone();
        let removed = staged
            .remove(*id)
            .ok_or_else(|| LiveAlbumError::not_found("Definition", id.to_string()))?;
        self.persist(&staged).await?;
        *state = staged;

        info!(name = %removed.name, "Deleted definition");
        Ok(removed)
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let records: Vec<&SearchDefinition> = state.by_id.values().collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| LiveAlbumError::PersistenceFailed(e.to_string()))?;

        self.file_system
            .write_file_atomic(&self.path, Bytes::from(json))
            .await
            .map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "Failed to persist definitions");
                LiveAlbumError::PersistenceFailed(e.to_string())
            })
    }
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("path", &self.path)
            .finish()
    }
}
