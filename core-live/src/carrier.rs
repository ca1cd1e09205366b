//! Embedded-metadata carrier: definitions living in collection descriptions.

use crate::codec;
use crate::definition::{DefinitionId, RunStats, SearchDefinition};
use crate::{LiveAlbumError, Result};
use bridge_traits::catalog::AssetCatalog;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Await a catalog call, bounded by `limit`
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = BridgeResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(LiveAlbumError::from),
        Err(_) => Err(LiveAlbumError::Timeout(limit.as_secs())),
    }
}

/// Reads and writes definitions embedded in collection descriptions
#[derive(Clone)]
pub struct EmbeddedCarrier {
    catalog: Arc<dyn AssetCatalog>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl EmbeddedCarrier {
    pub fn new(catalog: Arc<dyn AssetCatalog>, clock: Arc<dyn Clock>, call_timeout: Duration) -> Self {
        Self {
            catalog,
            clock,
            call_timeout,
        }
    }

    /// Scan every collection and decode the live ones.
    ///
    /// Descriptions that are plain text or malformed are skipped.
    pub async fn discover(&self) -> Result<Vec<SearchDefinition>> {
        let collections = bounded(self.call_timeout, self.catalog.list_collections()).await?;
        let now = self.clock.now();

        let mut found = Vec::new();
        for collection in collections {
            if !codec::is_live(&collection.description) {
                continue;
            }
            match codec::decode(&collection.description) {
                Ok(metadata) => {
                    found.push(metadata.into_definition(&collection.id, &collection.name, now))
                }
                Err(e) => warn!(collection_id = %collection.id, error = %e, "Skipping live metadata"),
            }
        }

        debug!(count = found.len(), "Discovered embedded definitions");
        Ok(found)
    }

    /// Load the definition embedded in one collection.
    ///
    /// Returns `Ok(None)` when the collection's description is not live
    /// metadata.
    pub async fn load(&self, collection_id: &str, collection_name: &str) -> Result<Option<SearchDefinition>> {
        let description = bounded(
            self.call_timeout,
            self.catalog.collection_description(collection_id),
        )
        .await?;

        match codec::decode(&description) {
            Ok(metadata) => Ok(Some(metadata.into_definition(
                collection_id,
                collection_name,
                self.clock.now(),
            ))),
            Err(LiveAlbumError::NotLive) | Err(LiveAlbumError::MalformedMetadata(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a definition into its destination collection's description
    pub async fn write(&self, definition: &SearchDefinition) -> Result<()> {
        let collection_id = definition
            .destination_collection_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LiveAlbumError::DestinationUnresolved(definition.name.clone()))?;

        let encoded = codec::encode(definition)?;
        bounded(
            self.call_timeout,
            self.catalog.set_collection_description(collection_id, &encoded),
        )
        .await
    }

    /// Merge run bookkeeping into the metadata a collection carries now.
    ///
    /// Returns `Ok(false)` without writing when the description is no longer
    /// live or belongs to a different definition.
    pub async fn record_run(
        &self,
        collection_id: &str,
        id: DefinitionId,
        at: DateTime<Utc>,
        stats: RunStats,
    ) -> Result<bool> {
        let description = bounded(
            self.call_timeout,
            self.catalog.collection_description(collection_id),
        )
        .await?;

        let mut metadata = match codec::decode(&description) {
            Ok(metadata) => metadata,
            Err(LiveAlbumError::NotLive) | Err(LiveAlbumError::MalformedMetadata(_)) => {
                return Ok(false)
            }
            Err(e) => return Err(e),
        };
        let current_id = metadata
            .id
            .unwrap_or_else(|| DefinitionId::for_collection(collection_id));
        if current_id != id {
            return Ok(false);
        }

        metadata.last_run_at = Some(at);
        metadata.stats = stats;
        let encoded = codec::encode_metadata(&metadata)?;
        bounded(
            self.call_timeout,
            self.catalog.set_collection_description(collection_id, &encoded),
        )
        .await?;
        Ok(true)
    }

    /// Replace live metadata with the plain description it wraps
    pub async fn clear(&self, collection_id: &str) -> Result<SearchDefinition> {
        let description = bounded(
            self.call_timeout,
            self.catalog.collection_description(collection_id),
        )
        .await?;
        let metadata = match codec::decode(&description) {
            // Plain prose was never live metadata.
            Err(LiveAlbumError::MalformedMetadata(_))
                if !description.trim_start().starts_with('{') =>
            {
                return Err(LiveAlbumError::NotLive)
            }
            other => other?,
        };
        let definition = metadata.into_definition(collection_id, "", self.clock.now());

        bounded(
            self.call_timeout,
            self.catalog
                .set_collection_description(collection_id, &definition.description),
        )
        .await?;
        Ok(definition)
    }
}
