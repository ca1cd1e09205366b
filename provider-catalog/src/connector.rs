//! REST catalog connector implementation
//!
//! Implements the `AssetCatalog` trait over the catalog's HTTP API.

use async_trait::async_trait;
use bridge_traits::catalog::{
    AssetCatalog, AssetId, BulkOutcome, CollectionId, CollectionSummary, SearchKind, SearchSpec,
};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::CatalogConfig;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::CatalogError;
use crate::types::{
    AlbumResponse, BulkIdResult, BulkIdsRequest, CreateAlbumRequest, SearchRequest,
    SearchResponse, UpdateAlbumRequest,
};

/// Largest page the search endpoints accept
const MAX_PAGE_SIZE: u32 = 1000;

/// REST catalog connector
///
/// Implements `AssetCatalog` on top of an injected [`HttpClient`], which
/// owns transport concerns (TLS, pooling, retry with backoff on 429/5xx).
///
/// # Example
///
/// ```ignore
/// use provider_catalog::RestCatalogConnector;
/// use bridge_traits::catalog::{AssetCatalog, SearchSpec};
///
/// let connector = RestCatalogConnector::new(http_client, &catalog_config);
/// let ids = connector.search(&SearchSpec::smart("sunset"), 200).await?;
/// ```
pub struct RestCatalogConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl RestCatalogConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &CatalogConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn album_url(&self, album_id: &str, suffix: &str) -> String {
        self.url(&format!("/albums/{}{}", urlencoding::encode(album_id), suffix))
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url).api_key(self.api_key.as_str())
    }

    /// Send a request and map non-2xx statuses to connector errors.
    ///
    /// `album_id` names the album a 404 refers to, when there is one.
    async fn send(&self, request: HttpRequest, album_id: Option<&str>) -> Result<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();
        let response = self
            .http_client
            .execute(request, self.retry_policy.clone())
            .await?;

        if response.is_success() {
            debug!(%method, url = %url, status = response.status, "Catalog request succeeded");
            return Ok(response);
        }

        let message = response.text_lossy();
        warn!(%method, url = %url, status = response.status, "Catalog request failed");

        let error = match (response.status, album_id) {
            (401 | 403, _) => CatalogError::AuthenticationFailed(message),
            (404, Some(album_id)) => CatalogError::AlbumNotFound {
                album_id: album_id.to_string(),
            },
            (status_code, _) => CatalogError::ApiError {
                status_code,
                message,
            },
        };
        Err(error.into())
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| CatalogError::ParseError(e.to_string()).into())
    }

    async fn get_album(&self, album_id: &str) -> Result<AlbumResponse> {
        let request = self.request(HttpMethod::Get, self.album_url(album_id, ""));
        let response = self.send(request, Some(album_id)).await?;
        Self::parse(&response)
    }

    async fn bulk(
        &self,
        method: HttpMethod,
        collection_id: &str,
        ids: &[AssetId],
    ) -> Result<BulkOutcome> {
        if ids.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let request = self
            .request(method, self.album_url(collection_id, "/assets"))
            .json(&BulkIdsRequest { ids })?;
        let response = self.send(request, Some(collection_id)).await?;
        let results: Vec<BulkIdResult> = Self::parse(&response)?;

        Ok(partition(results, method == HttpMethod::Put))
    }
}

/// Split per-id results; "duplicate" on add means already a member
fn partition(results: Vec<BulkIdResult>, adding: bool) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for result in results {
        if result.success || (adding && result.is_duplicate()) {
            outcome.succeeded.push(result.id);
        } else {
            debug!(id = %result.id, error = ?result.error, "Bulk item rejected");
            outcome.failed.push(result.id);
        }
    }
    outcome
}

#[async_trait]
impl AssetCatalog for RestCatalogConnector {
    #[instrument(skip(self, spec), fields(kind = %spec.kind))]
    async fn search(&self, spec: &SearchSpec, max_results: u32) -> Result<Vec<AssetId>> {
        let path = match spec.kind {
            SearchKind::Smart => "/search/smart",
            SearchKind::Advanced => "/search/metadata",
        };

        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;

        while (ids.len() as u32) < max_results {
            let remaining = max_results - ids.len() as u32;
            let body = SearchRequest::from_filter(&spec.filter, page, remaining.min(MAX_PAGE_SIZE));
            let request = self.request(HttpMethod::Post, self.url(path)).json(&body)?;
            let response: SearchResponse = Self::parse(&self.send(request, None).await?)?;

            let hits = response.assets.items.len();
            for asset in response.assets.items {
                if ids.len() as u32 >= max_results {
                    break;
                }
                if seen.insert(asset.id.clone()) {
                    ids.push(asset.id);
                }
            }

            match response.assets.next_page.and_then(|p| p.parse::<u32>().ok()) {
                Some(next) if hits > 0 => page = next,
                _ => break,
            }
        }

        debug!(count = ids.len(), pages = page, "Search complete");
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn collection_contents(&self, collection_id: &str) -> Result<Vec<AssetId>> {
        let album = self.get_album(collection_id).await?;
        Ok(album.assets.into_iter().map(|a| a.id).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn bulk_add(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome> {
        self.bulk(HttpMethod::Put, collection_id, ids).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn bulk_remove(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome> {
        self.bulk(HttpMethod::Delete, collection_id, ids).await
    }

    #[instrument(skip(self, description))]
    async fn create_collection(&self, name: &str, description: &str) -> Result<CollectionId> {
        let request = self
            .request(HttpMethod::Post, self.url("/albums"))
            .json(&CreateAlbumRequest {
                album_name: name,
                description,
            })?;
        let album: AlbumResponse = Self::parse(&self.send(request, None).await?)?;

        info!(album_id = %album.id, "Created album");
        Ok(album.id)
    }

    async fn collection_description(&self, collection_id: &str) -> Result<String> {
        Ok(self.get_album(collection_id).await?.description)
    }

    #[instrument(skip(self, description))]
    async fn set_collection_description(
        &self,
        collection_id: &str,
        description: &str,
    ) -> Result<()> {
        let request = self
            .request(HttpMethod::Patch, self.album_url(collection_id, ""))
            .json(&UpdateAlbumRequest { description })?;
        self.send(request, Some(collection_id)).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let request = self.request(HttpMethod::Get, self.url("/albums"));
        let albums: Vec<AlbumResponse> = Self::parse(&self.send(request, None).await?)?;
        Ok(albums.into_iter().map(CollectionSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    fn connector(mock_http: MockHttpClient) -> RestCatalogConnector {
        let config = CatalogConfig::new("https://photos.example.com/api/", "secret-key");
        RestCatalogConnector::new(Arc::new(mock_http), &config)
    }

    fn body_json(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_smart_search_pages_until_limit() {
        let mut mock_http = MockHttpClient::new();
        let mut call = 0;

        mock_http
            .expect_execute()
            .times(2)
            .returning(move |req, _| {
                call += 1;
                assert_eq!(req.method, HttpMethod::Post);
                assert_eq!(req.url, "https://photos.example.com/api/search/smart");
                assert_eq!(req.headers.get("x-api-key"), Some(&"secret-key".to_string()));

                let body = body_json(&req);
                assert_eq!(body["query"], "beach");
                if call == 1 {
                    assert_eq!(body["page"], 1);
                    assert_eq!(body["size"], 3);
                    Ok(response(
                        200,
                        r#"{"assets": {"items": [{"id": "a"}, {"id": "b"}], "nextPage": "2"}}"#,
                    ))
                } else {
                    assert_eq!(body["page"], 2);
                    assert_eq!(body["size"], 1);
                    Ok(response(
                        200,
                        r#"{"assets": {"items": [{"id": "c"}, {"id": "d"}], "nextPage": "3"}}"#,
                    ))
                }
            });

        let ids = connector(mock_http)
            .search(&SearchSpec::smart("beach"), 3)
            .await
            .unwrap();

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_advanced_search_stops_on_last_page() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|req, _| {
                assert!(req.url.ends_with("/search/metadata"));
                assert_eq!(body_json(&req)["country"], "Norway");
                Ok(response(
                    200,
                    r#"{"assets": {"items": [{"id": "n1"}, {"id": "n1"}], "nextPage": null}}"#,
                ))
            });

        let filter = bridge_traits::catalog::SearchFilter {
            country: Some("Norway".to_string()),
            ..Default::default()
        };
        let ids = connector(mock_http)
            .search(&SearchSpec::advanced(filter), 100)
            .await
            .unwrap();

        assert_eq!(ids, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_collection_contents() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|req, _| {
                assert_eq!(req.method, HttpMethod::Get);
                assert_eq!(req.url, "https://photos.example.com/api/albums/album%201");
                Ok(response(
                    200,
                    r#"{"id": "album 1", "albumName": "Trips", "assets": [{"id": "x"}, {"id": "y"}]}"#,
                ))
            });

        let ids = connector(mock_http)
            .collection_contents("album 1")
            .await
            .unwrap();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_missing_album_is_not_found() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(response(404, "Album not found")));

        let err = connector(mock_http)
            .collection_contents("gone")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(ref m) if m.contains("gone")));
    }

    #[tokio::test]
    async fn test_bulk_add_treats_duplicate_as_success() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|req, _| {
                assert_eq!(req.method, HttpMethod::Put);
                assert!(req.url.ends_with("/albums/a1/assets"));
                assert_eq!(body_json(&req)["ids"], serde_json::json!(["x", "y", "z"]));
                Ok(response(
                    200,
                    r#"[
                        {"id": "x", "success": true},
                        {"id": "y", "success": false, "error": "duplicate"},
                        {"id": "z", "success": false, "error": "no_permission"}
                    ]"#,
                ))
            });

        let ids = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let outcome = connector(mock_http).bulk_add("a1", &ids).await.unwrap();

        assert_eq!(outcome.succeeded, vec!["x", "y"]);
        assert_eq!(outcome.failed, vec!["z"]);
    }

    #[tokio::test]
    async fn test_bulk_remove_duplicate_is_failure() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|req, _| {
                assert_eq!(req.method, HttpMethod::Delete);
                Ok(response(
                    200,
                    r#"[{"id": "x", "success": false, "error": "duplicate"}]"#,
                ))
            });

        let outcome = connector(mock_http)
            .bulk_remove("a1", &["x".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.failed, vec!["x"]);
    }

    #[tokio::test]
    async fn test_empty_bulk_makes_no_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let outcome = connector(mock_http).bulk_add("a1", &[]).await.unwrap();
        assert_eq!(outcome, BulkOutcome::default());
    }

    #[tokio::test]
    async fn test_create_and_describe_album() {
        let mut mock_http = MockHttpClient::new();
        let mut call = 0;

        mock_http
            .expect_execute()
            .times(2)
            .returning(move |req, _| {
                call += 1;
                if call == 1 {
                    assert_eq!(req.method, HttpMethod::Post);
                    let body = body_json(&req);
                    assert_eq!(body["albumName"], "Road trips");
                    Ok(response(201, r#"{"id": "new-1", "albumName": "Road trips"}"#))
                } else {
                    assert_eq!(req.method, HttpMethod::Patch);
                    assert!(req.url.ends_with("/albums/new-1"));
                    assert_eq!(body_json(&req)["description"], "{\"live_album\":true}");
                    Ok(response(200, r#"{"id": "new-1", "albumName": "Road trips"}"#))
                }
            });

        let connector = connector(mock_http);
        let id = connector.create_collection("Road trips", "").await.unwrap();
        assert_eq!(id, "new-1");
        connector
            .set_collection_description(&id, "{\"live_album\":true}")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_collections() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_, _| {
                Ok(response(
                    200,
                    r#"[
                        {"id": "a1", "albumName": "Trips", "description": "fun", "assetCount": 4},
                        {"id": "a2", "albumName": "Pets"}
                    ]"#,
                ))
            });

        let albums = connector(mock_http).list_collections().await.unwrap();
        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].description, "fun");
        assert_eq!(albums[0].asset_count, 4);
        assert_eq!(albums[1].name, "Pets");
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(response(401, "Invalid API key")));

        let err = connector(mock_http).list_collections().await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(ref m) if m.contains("Authentication")));
    }

    #[tokio::test]
    async fn test_malformed_response_is_parse_error() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(response(200, "<html>")));

        let err = connector(mock_http).list_collections().await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(ref m) if m.contains("parse")));
    }
}
