//! Catalog API request and response types
//!
//! Wire shapes of the photo catalog's REST API. Field names are camelCase on
//! the wire.

use bridge_traits::catalog::{AssetKind, CollectionSummary, SearchFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Asset reference as it appears in album and search payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
}

/// Album resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumResponse {
    pub id: String,
    pub album_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub asset_count: u64,
    /// Only populated by the single-album endpoint
    #[serde(default)]
    pub assets: Vec<AssetRef>,
}

impl From<AlbumResponse> for CollectionSummary {
    fn from(album: AlbumResponse) -> Self {
        Self {
            id: album.id,
            name: album.album_name,
            description: album.description,
            asset_count: album.asset_count,
        }
    }
}

/// `POST /albums` body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest<'a> {
    pub album_name: &'a str,
    pub description: &'a str,
}

/// `PATCH /albums/{id}` body
#[derive(Debug, Serialize)]
pub struct UpdateAlbumRequest<'a> {
    pub description: &'a str,
}

/// `PUT`/`DELETE /albums/{id}/assets` body
#[derive(Debug, Serialize)]
pub struct BulkIdsRequest<'a> {
    pub ids: &'a [String],
}

/// Per-id result of a bulk membership call
#[derive(Debug, Clone, Deserialize)]
pub struct BulkIdResult {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl BulkIdResult {
    /// Error code the catalog uses for "already a member"
    pub const DUPLICATE: &'static str = "duplicate";

    pub fn is_duplicate(&self) -> bool {
        self.error.as_deref() == Some(Self::DUPLICATE)
    }
}

/// Wire media type
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireAssetType {
    Image,
    Video,
}

impl From<AssetKind> for WireAssetType {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Image => WireAssetType::Image,
            AssetKind::Video => WireAssetType::Video,
        }
    }
}

/// Body of `POST /search/smart` and `POST /search/metadata`
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub person_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "make", skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(rename = "model", skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_motion: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<WireAssetType>,
    pub page: u32,
    pub size: u32,
}

impl SearchRequest {
    pub fn from_filter(filter: &SearchFilter, page: u32, size: u32) -> Self {
        Self {
            query: filter.query_text().map(str::to_string),
            person_ids: filter.person_ids.clone(),
            city: filter.city.clone(),
            state: filter.state.clone(),
            country: filter.country.clone(),
            camera_make: filter.camera_make.clone(),
            camera_model: filter.camera_model.clone(),
            lens_model: filter.lens_model.clone(),
            taken_after: filter.taken_after,
            taken_before: filter.taken_before,
            is_favorite: filter.is_favorite,
            is_archived: filter.is_archived,
            is_motion: filter.is_motion,
            asset_type: filter.asset_type.map(WireAssetType::from),
            page,
            size,
        }
    }
}

/// Search response envelope
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub assets: SearchPage,
}

/// One page of search hits
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<AssetRef>,
    /// Next page number as a string, absent on the last page
    #[serde(default)]
    pub next_page: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_wire_names() {
        let filter = SearchFilter {
            camera_make: Some("Fujifilm".to_string()),
            asset_type: Some(AssetKind::Video),
            person_ids: vec!["p1".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_value(SearchRequest::from_filter(&filter, 2, 250)).unwrap();

        assert_eq!(json["make"], "Fujifilm");
        assert_eq!(json["type"], "VIDEO");
        assert_eq!(json["personIds"][0], "p1");
        assert_eq!(json["page"], 2);
        assert!(json.get("query").is_none());
    }

    #[test]
    fn test_album_response_defaults() {
        let album: AlbumResponse =
            serde_json::from_str(r#"{"id": "a1", "albumName": "Trips"}"#).unwrap();
        let summary = CollectionSummary::from(album);

        assert_eq!(summary.name, "Trips");
        assert_eq!(summary.description, "");
        assert_eq!(summary.asset_count, 0);
    }

    #[test]
    fn test_duplicate_detection() {
        let result: BulkIdResult =
            serde_json::from_str(r#"{"id": "x", "success": false, "error": "duplicate"}"#)
                .unwrap();
        assert!(result.is_duplicate());
    }
}
