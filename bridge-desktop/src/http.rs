//! Catalog transport over `reqwest`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// `reqwest`-backed [`HttpClient`]
///
/// One pooled client per process; the per-request timeout is the engine's
/// catalog call timeout.
pub struct ReqwestHttpClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Client whose requests time out after `timeout`.
    ///
    /// Falls back to reqwest's defaults if the tuned builder cannot be
    /// constructed (e.g. the TLS backend fails to initialize).
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("live-albums/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client configuration");
                Client::new()
            });

        Self { client, timeout }
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.request(Self::method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }

    fn transport_error(&self, e: &reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            BridgeError::NotAvailable(format!("catalog unreachable: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut retry = 0;

        loop {
            let last = retry + 1 >= attempts;
            debug!(method = %request.method, url = %request.url, attempt = retry + 1, "Sending request");

            match self.attempt(&request).await {
                Ok(response) if response.is_retryable() && !last => {
                    warn!(status = response.status, attempt = retry + 1, "Retryable response");
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_builder() || last => return Err(self.transport_error(&e)),
                Err(e) => {
                    warn!(error = %e, attempt = retry + 1, "Request failed");
                }
            }

            retry += 1;
            let delay = policy.delay_for(retry);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}
