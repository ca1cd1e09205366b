//! Asset Catalog Abstraction
//!
//! Contract between the live-album core and the remote photo/video catalog
//! service. The catalog owns search ranking, album CRUD and bulk membership
//! changes; the core only consumes the operations below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier of an asset in the catalog
pub type AssetId = String;

/// Opaque identifier of a collection (album) in the catalog
pub type CollectionId = String;

/// How the catalog should interpret a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Free-text, ranked search over the catalog's embeddings
    Smart,
    /// Structured metadata filters
    Advanced,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Smart => "smart",
            SearchKind::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset media type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

/// Structured search filter.
///
/// One field per known filter dimension. A "smart" search is the degenerate
/// case where only `query` is set. Unknown keys are rejected when a filter is
/// deserialized so ad hoc parameters never leak into the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchFilter {
    /// Free-text query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// People that must appear in the asset
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub person_ids: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,

    /// Capture time lower bound (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_after: Option<DateTime<Utc>>,
    /// Capture time upper bound (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_before: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_motion: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetKind>,
}

impl SearchFilter {
    /// Filter carrying only a free-text query
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Returns the trimmed query text, if any is present
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Check whether at least one non-text filter dimension is set
    pub fn has_structured_filters(&self) -> bool {
        let non_blank = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        !self.person_ids.is_empty()
            || non_blank(&self.city)
            || non_blank(&self.state)
            || non_blank(&self.country)
            || non_blank(&self.camera_make)
            || non_blank(&self.camera_model)
            || non_blank(&self.lens_model)
            || self.taken_after.is_some()
            || self.taken_before.is_some()
            || self.is_favorite.is_some()
            || self.is_archived.is_some()
            || self.is_motion.is_some()
            || self.asset_type.is_some()
    }

    /// Check whether the filter would match without any constraint
    pub fn is_empty(&self) -> bool {
        self.query_text().is_none() && !self.has_structured_filters()
    }
}

/// A search as handed to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub kind: SearchKind,
    pub filter: SearchFilter,
}

impl SearchSpec {
    pub fn smart(query: impl Into<String>) -> Self {
        Self {
            kind: SearchKind::Smart,
            filter: SearchFilter::text(query),
        }
    }

    pub fn advanced(filter: SearchFilter) -> Self {
        Self {
            kind: SearchKind::Advanced,
            filter,
        }
    }
}

/// Collection (album) listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: CollectionId,
    pub name: String,
    pub description: String,
    pub asset_count: u64,
}

/// Result of a best-effort bulk membership change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<AssetId>,
    pub failed: Vec<AssetId>,
}

impl BulkOutcome {
    /// Every requested id failed, e.g. because the call itself errored
    pub fn all_failed(ids: &[AssetId]) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: ids.to_vec(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Remote asset catalog trait
///
/// Implementations own the wire format of the catalog service. Each call is
/// independent: there is no client-side transaction spanning calls, and bulk
/// operations are best-effort, reporting per-id success.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::{AssetCatalog, SearchSpec};
///
/// async fn count_beach_photos(catalog: &dyn AssetCatalog) -> Result<usize> {
///     let ids = catalog.search(&SearchSpec::smart("beach at sunset"), 500).await?;
///     Ok(ids.len())
/// }
/// ```
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Run a search, returning at most `max_results` asset ids in rank order
    async fn search(&self, spec: &SearchSpec, max_results: u32) -> Result<Vec<AssetId>>;

    /// List the asset ids currently in a collection
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NotFound` if the collection does not exist
    async fn collection_contents(&self, collection_id: &str) -> Result<Vec<AssetId>>;

    /// Add assets to a collection, reporting per-id success
    async fn bulk_add(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome>;

    /// Remove assets from a collection, reporting per-id success
    async fn bulk_remove(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome>;

    /// Create an empty collection and return its id
    async fn create_collection(&self, name: &str, description: &str) -> Result<CollectionId>;

    /// Read a collection's description field
    async fn collection_description(&self, collection_id: &str) -> Result<String>;

    /// Overwrite a collection's description field
    async fn set_collection_description(&self, collection_id: &str, description: &str)
        -> Result<()>;

    /// List every collection visible to the caller
    async fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    /// Find a collection by name (case-insensitive)
    ///
    /// When several collections share the name, the first one listed wins.
    async fn find_collection_by_name(&self, name: &str) -> Result<Option<CollectionSummary>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .find(|c| c.name.trim().to_lowercase() == wanted))
    }
}
