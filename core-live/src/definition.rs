//! # Search Definitions
//!
//! The saved search + sync configuration that links a catalog query to a
//! destination collection. One shape serves both carriers: records held in the
//! [`DefinitionStore`](crate::store::DefinitionStore) and records embedded in
//! a collection's own description by the [`codec`](crate::codec).

use crate::{LiveAlbumError, Result};
use bridge_traits::catalog::{CollectionId, SearchSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Namespace for ids derived from a collection id
const EMBEDDED_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c69_7665_2d61_6c62_756d_2d65_6d62_6564);

/// Unique identifier for a search definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(Uuid);

impl DefinitionId {
    /// Create a new random definition ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable ID for an embedded definition that was written without one.
    ///
    /// Repeated scans of the same collection yield the same ID.
    pub fn for_collection(collection_id: &str) -> Self {
        Self(Uuid::new_v5(&EMBEDDED_ID_NAMESPACE, collection_id.as_bytes()))
    }

    /// Parse a definition ID from a string
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the string is not a valid UUID, since no
    /// definition can carry such an id.
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| LiveAlbumError::not_found("Definition", s))
    }
}

impl Default for DefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DefinitionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<DefinitionId> for Uuid {
    fn from(id: DefinitionId) -> Self {
        id.0
    }
}

// ============================================================================
// Strategy & Source
// ============================================================================

/// How reconciliation treats assets that no longer match the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// Only add newly matching assets
    #[default]
    AddOnly,
    /// Also remove assets that stopped matching
    FullSync,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::AddOnly => "add-only",
            SyncStrategy::FullSync => "full-sync",
        }
    }

    pub fn removes(&self) -> bool {
        matches!(self, SyncStrategy::FullSync)
    }
}

impl FromStr for SyncStrategy {
    type Err = LiveAlbumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "add-only" | "add_only" => Ok(SyncStrategy::AddOnly),
            "full-sync" | "full_sync" => Ok(SyncStrategy::FullSync),
            other => Err(LiveAlbumError::InvalidDefinition(format!(
                "sync strategy must be 'add-only' or 'full-sync', got '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which carrier owns a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionSource {
    /// Held in the definition store file
    #[default]
    Store,
    /// Encoded into the destination collection's description
    Embedded,
}

impl DefinitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionSource::Store => "store",
            DefinitionSource::Embedded => "embedded",
        }
    }
}

impl std::fmt::Display for DefinitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Definition
// ============================================================================

/// Statistics from the most recent reconciliation attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub last_result_count: u64,
    pub last_added_count: u64,
    pub last_removed_count: u64,
    pub last_failed_count: u64,
    /// Empty when the last run had no error
    pub last_run_error: String,
}

impl RunStats {
    /// Stats for a run that aborted before mutating anything
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            last_run_error: message.into(),
            ..Default::default()
        }
    }

    pub fn has_error(&self) -> bool {
        !self.last_run_error.is_empty()
    }
}

/// A saved search linked to a destination collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDefinition {
    pub id: DefinitionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_collection_id: Option<CollectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_collection_name: Option<String>,
    pub search: SearchSpec,
    pub max_results: u32,
    #[serde(default)]
    pub sync_strategy: SyncStrategy,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: RunStats,
    /// Carrier is implied by where the record was read from
    #[serde(skip)]
    pub source: DefinitionSource,
}

fn enabled_by_default() -> bool {
    true
}

impl SearchDefinition {
    /// Create an enabled add-only definition with a fresh id
    pub fn new(name: impl Into<String>, search: SearchSpec, max_results: u32) -> Self {
        let now = Utc::now();
        Self {
            id: DefinitionId::new(),
            name: name.into(),
            description: String::new(),
            destination_collection_id: None,
            destination_collection_name: None,
            search,
            max_results,
            sync_strategy: SyncStrategy::AddOnly,
            enabled: true,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            stats: RunStats::default(),
            source: DefinitionSource::Store,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_destination_id(mut self, collection_id: impl Into<CollectionId>) -> Self {
        self.destination_collection_id = Some(collection_id.into());
        self
    }

    pub fn with_destination_name(mut self, name: impl Into<String>) -> Self {
        self.destination_collection_name = Some(name.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Key used by the case-insensitive name index
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Stable ordering key: name (case-insensitive), then id
    pub fn sort_key(&self) -> (String, DefinitionId) {
        (self.name_key(), self.id)
    }

    /// Human-readable destination for logs and errors
    pub fn destination_label(&self) -> String {
        match (&self.destination_collection_id, &self.destination_collection_name) {
            (Some(id), _) if !id.is_empty() => id.clone(),
            (_, Some(name)) if !name.trim().is_empty() => format!("name:{}", name.trim()),
            _ => "<unresolved>".to_string(),
        }
    }

    /// Record a run that failed before any mutation
    pub fn record_failure(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.last_run_at = Some(at);
        self.stats = RunStats::failed(message);
    }

    /// Record the statistics of a completed run
    pub fn record_run(&mut self, at: DateTime<Utc>, stats: RunStats) {
        self.last_run_at = Some(at);
        self.stats = stats;
    }
}

/// Normalize a name for case-insensitive comparison
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_id_is_deterministic() {
        let a = DefinitionId::for_collection("album-1");
        let b = DefinitionId::for_collection("album-1");
        let c = DefinitionId::for_collection("album-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_definition_id_parse() {
        let id = DefinitionId::new();
        assert_eq!(DefinitionId::from_string(&id.to_string()).unwrap(), id);
        assert!(matches!(
            DefinitionId::from_string("not-a-uuid"),
            Err(LiveAlbumError::NotFound { .. })
        ));
    }

    #[test]
    fn test_sync_strategy_parse_and_serde() {
        assert_eq!("Full-Sync".parse::<SyncStrategy>().unwrap(), SyncStrategy::FullSync);
        assert_eq!("add_only".parse::<SyncStrategy>().unwrap(), SyncStrategy::AddOnly);
        assert!(matches!(
            "mirror".parse::<SyncStrategy>(),
            Err(LiveAlbumError::InvalidDefinition(_))
        ));

        let json = serde_json::to_string(&SyncStrategy::FullSync).unwrap();
        assert_eq!(json, "\"full-sync\"");
    }

    #[test]
    fn test_record_failure_zeroes_counts() {
        let mut def = SearchDefinition::new("Beach", SearchSpec::smart("beach"), 100);
        def.stats.last_added_count = 7;
        let at = Utc::now();

        def.record_failure(at, "catalog unavailable");

        assert_eq!(def.last_run_at, Some(at));
        assert_eq!(def.stats.last_added_count, 0);
        assert_eq!(def.stats.last_result_count, 0);
        assert!(def.stats.has_error());
    }

    #[test]
    fn test_source_not_serialized() {
        let mut def = SearchDefinition::new("Beach", SearchSpec::smart("beach"), 100);
        def.source = DefinitionSource::Embedded;
        let json = serde_json::to_string(&def).unwrap();
        assert!(!json.contains("source"));

        let back: SearchDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, DefinitionSource::Store);
    }

    #[test]
    fn test_destination_label() {
        let def = SearchDefinition::new("x", SearchSpec::smart("x"), 1);
        assert_eq!(def.destination_label(), "<unresolved>");
        let def = def.with_destination_name(" Trips ");
        assert_eq!(def.destination_label(), "name:Trips");
        let def = def.with_destination_id("c-9");
        assert_eq!(def.destination_label(), "c-9");
    }
}
