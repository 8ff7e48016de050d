// src/http.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Failure reported by an [`HttpClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request never produced a response (DNS, connect, TLS, body read).
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Minimal outbound HTTP capability used for discovery, JWKS and
/// introspection traffic.
///
/// Implementations return the response body as text. Substitute
/// implementations are how tests run without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs a GET and returns the body.
    async fn get(&self, url: &str) -> Result<String, HttpError>;

    /// Performs a POST of `body` with the given headers and returns the body.
    async fn post(
        &self,
        url: &str,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, HttpError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    // reqwest::Client is internally ref-counted, cloning is cheap.
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client with reqwest's defaults (no request timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that gives up on a request after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an already configured `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read_body(url: &str, response: reqwest::Response) -> Result<String, HttpError> {
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[instrument(skip(self), err)]
    async fn get(&self, url: &str) -> Result<String, HttpError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Self::read_body(url, response).await
    }

    // Body and headers carry tokens and client credentials, keep them out of spans.
    #[instrument(skip(self, body, headers), err)]
    async fn post(
        &self,
        url: &str,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, HttpError> {
        debug!("POST {} ({} bytes)", url, body.len());
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Self::read_body(url, response).await
    }
}
