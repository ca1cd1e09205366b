//! # Live Album Metadata Codec
//!
//! Serializes a definition's live-album fields into the single string carried
//! by the destination collection's description, and back.
//!
//! The encoded form is a JSON object whose `live_album` marker field is
//! `true`. Descriptions that are not JSON are [`LiveAlbumError::MalformedMetadata`];
//! JSON without the marker is [`LiveAlbumError::NotLive`]. Scanning code uses
//! [`is_live`] and never surfaces either error.
//!
//! ```ignore
//! let text = codec::encode(&definition)?;
//! catalog.set_collection_description(&collection_id, &text).await?;
//!
//! let metadata = codec::decode(&text)?;
//! let restored = metadata.into_definition(&collection_id, &collection_name, clock.now());
//! ```

use crate::definition::{
    DefinitionId, DefinitionSource, RunStats, SearchDefinition, SyncStrategy,
};
use crate::{LiveAlbumError, Result};
use bridge_traits::catalog::{SearchKind, SearchSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Marker field identifying live-album metadata
pub const MARKER_FIELD: &str = "live_album";

/// Current encoding version
pub const METADATA_VERSION: u32 = 1;

/// Decoded live-album metadata, as carried in a collection description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAlbumMetadata {
    pub live_album: bool,
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DefinitionId>,
    #[serde(default)]
    pub name: String,
    /// Human description the collection had before it became live
    #[serde(default)]
    pub description: String,
    pub search: SearchSpec,
    pub max_results: u32,
    #[serde(default)]
    pub sync_strategy: SyncStrategy,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: RunStats,
}

fn current_version() -> u32 {
    METADATA_VERSION
}

fn enabled_by_default() -> bool {
    true
}

impl LiveAlbumMetadata {
    /// Build the embedded definition for a collection.
    ///
    /// The collection is the destination by construction. Metadata written
    /// without an id gets one derived from the collection id; missing
    /// timestamps fall back to `now`.
    pub fn into_definition(
        self,
        collection_id: &str,
        collection_name: &str,
        now: DateTime<Utc>,
    ) -> SearchDefinition {
        let name = if self.name.trim().is_empty() {
            collection_name.to_string()
        } else {
            self.name
        };
        let created_at = self.created_at.unwrap_or(now);

        SearchDefinition {
            id: self
                .id
                .unwrap_or_else(|| DefinitionId::for_collection(collection_id)),
            name,
            description: self.description,
            destination_collection_id: Some(collection_id.to_string()),
            destination_collection_name: Some(collection_name.to_string()),
            search: self.search,
            max_results: self.max_results,
            sync_strategy: self.sync_strategy,
            enabled: self.enabled,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            last_run_at: self.last_run_at,
            stats: self.stats,
            source: DefinitionSource::Embedded,
        }
    }
}

impl From<&SearchDefinition> for LiveAlbumMetadata {
    fn from(def: &SearchDefinition) -> Self {
        Self {
            live_album: true,
            version: METADATA_VERSION,
            id: Some(def.id),
            name: def.name.clone(),
            description: def.description.clone(),
            search: def.search.clone(),
            max_results: def.max_results,
            sync_strategy: def.sync_strategy,
            enabled: def.enabled,
            created_at: Some(def.created_at),
            updated_at: Some(def.updated_at),
            last_run_at: def.last_run_at,
            stats: def.stats.clone(),
        }
    }
}

/// Encode a definition's live-album fields.
///
/// The output is canonical: field order is fixed and unset optional filter
/// fields are omitted.
///
/// # Errors
///
/// Returns `MalformedMetadata` only if JSON serialization itself fails,
/// which does not happen for the in-memory definition shape.
pub fn encode(definition: &SearchDefinition) -> Result<String> {
    encode_metadata(&LiveAlbumMetadata::from(definition))
}

/// Encode metadata as decoded, without going through a definition
pub fn encode_metadata(metadata: &LiveAlbumMetadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| LiveAlbumError::MalformedMetadata(e.to_string()))
}

/// Decode a collection description.
///
/// # Errors
///
/// - `MalformedMetadata` if the text is not a JSON object of the expected shape
/// - `NotLive` if it is a JSON object without a `true` marker field
pub fn decode(text: &str) -> Result<LiveAlbumMetadata> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| LiveAlbumError::MalformedMetadata(e.to_string()))?;

    let Value::Object(fields) = &value else {
        return Err(LiveAlbumError::MalformedMetadata(
            "expected a JSON object".to_string(),
        ));
    };

    if fields.get(MARKER_FIELD).and_then(Value::as_bool) != Some(true) {
        return Err(LiveAlbumError::NotLive);
    }

    serde_json::from_value(value).map_err(|e| LiveAlbumError::MalformedMetadata(e.to_string()))
}

/// Check whether a description carries decodable live-album metadata
pub fn is_live(text: &str) -> bool {
    // Cheap reject for the common case of a plain-text description
    if !text.trim_start().starts_with('{') {
        return false;
    }
    decode(text).is_ok()
}

/// Validate a definition before it is encoded or persisted.
///
/// Normalizes in place: trims the name and clamps `max_results` to `ceiling`.
///
/// # Errors
///
/// Returns `InvalidDefinition` when:
/// - a smart search has no query text
/// - an advanced search has no structured filter field
/// - `max_results` is zero
pub fn validate(definition: &mut SearchDefinition, ceiling: u32) -> Result<()> {
    definition.name = definition.name.trim().to_string();
    validate_search(&definition.search)?;

    if definition.max_results == 0 {
        return Err(LiveAlbumError::InvalidDefinition(
            "max_results must be greater than zero".to_string(),
        ));
    }

    if definition.max_results > ceiling {
        debug!(
            requested = definition.max_results,
            ceiling, "Clamping max_results to ceiling"
        );
        definition.max_results = ceiling;
    }

    Ok(())
}

/// Validate only the search part of a definition
pub fn validate_search(search: &SearchSpec) -> Result<()> {
    match search.kind {
        SearchKind::Smart if search.filter.query_text().is_none() => {
            Err(LiveAlbumError::InvalidDefinition(
                "smart search requires non-empty query text".to_string(),
            ))
        }
        SearchKind::Advanced if !search.filter.has_structured_filters() => {
            Err(LiveAlbumError::InvalidDefinition(
                "advanced search requires at least one structured filter \
                 (people, place, camera, date range, flag or asset type)"
                    .to_string(),
            ))
        }
        _ => Ok(()),
    }
}
