//! HTTP Transport Seam
//!
//! The narrow transport a catalog connector needs: JSON requests with an
//! API key, raw status and body back, and retries for throttling and server
//! errors. Status interpretation stays with the connector.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Methods the catalog API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Request that expects a JSON response
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        Self {
            method,
            url: url.into(),
            headers,
            body: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Authenticate with the catalog's `x-api-key` header
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.header("x-api-key", key)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }
}

/// Response as received; non-2xx statuses are not errors at this layer
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Throttled or failed server-side; worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }

    /// Body for error messages, tolerating invalid UTF-8
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Retry schedule for retryable responses and transport failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff before retry number `retry` (1-based), capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Async HTTP transport
///
/// Implementations own TLS, connection pooling and the retry loop. A
/// response whose status is still retryable after the last attempt is
/// returned as-is so the caller can report the status.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
///
/// async fn album_count(client: &dyn HttpClient) -> Result<usize> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://photos.example.com/api/albums")
///         .api_key("key");
///     let response = client.execute(request, RetryPolicy::default()).await?;
///     let albums: Vec<serde_json::Value> = serde_json::from_slice(&response.body)?;
///     Ok(albums.len())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request, retrying per `policy`
    ///
    /// # Errors
    ///
    /// - `Timeout` when the final attempt timed out
    /// - `NotAvailable` when the host could not be reached
    /// - `OperationFailed` for any other transport failure
    async fn execute(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse>;
}
