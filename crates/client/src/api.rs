//! REST API client for the qpAdm HTTP endpoints.
//!
//! Wraps run submission, run and history retrieval, the daily usage status
//! and the population catalogue using [`reqwest`]. Requests carry a bearer
//! token from a [`TokenProvider`] when one is available.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qpadm_core::analysis::AnalysisRequest;
use qpadm_core::catalog::PopulationCatalog;
use qpadm_core::population::DatasetType;
use qpadm_core::run::AnalysisRun;
use qpadm_core::types::DbId;
use qpadm_core::usage::UsageStatus;

use crate::backend::AnalysisBackend;
use crate::retry::Retryable;
use crate::token::TokenProvider;

/// HTTP 429 Too Many Requests.
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Errors from the qpAdm REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("qpAdm API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The `error` or `detail` string from the body, or the raw body.
        message: String,
    },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status code, when the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::Decode(_) => None,
        }
    }

    /// The backend's failure reason verbatim, or this error's display text.
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the backend refused the run because the daily quota is spent.
    ///
    /// The backend reports this as an error message mentioning the daily
    /// limit (or the quota); the status code alone is ambiguous.
    pub fn is_quota_exhausted(&self) -> bool {
        let Self::Api { message, .. } = self else {
            return false;
        };
        let message = message.to_ascii_lowercase();
        (message.contains("daily") && message.contains("limit")) || message.contains("quota")
    }
}

impl Retryable for ApiError {
    fn is_rate_limited(&self) -> bool {
        if self.status() == Some(STATUS_TOO_MANY_REQUESTS) {
            return true;
        }
        let text = self.to_string().to_ascii_lowercase();
        text.contains("429") || text.contains("rate limit") || text.contains("too many requests")
    }
}

/// HTTP client for the qpAdm service.
pub struct HttpBackend {
    client: reqwest::Client,
    api_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBackend {
    /// Create a client with its own connection pool and request timeout.
    ///
    /// * `api_url` - Base URL, e.g. `https://host/api`.
    pub fn new(
        api_url: impl Into<String>,
        request_timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client, api_url, tokens))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            tokens,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    // ---- private helpers ----

    /// Attach the bearer token, if any, and send.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let request = match self.tokens.access_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        Ok(request.send().await?)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] carrying
    /// the backend's failure reason.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    /// `POST /qpadm/runs/`
    async fn submit_run(&self, request: &AnalysisRequest) -> Result<AnalysisRun, ApiError> {
        let response = self
            .send(self.client.post(self.url("qpadm/runs/")).json(request))
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /qpadm/runs/{id}/`
    async fn fetch_run(&self, run_id: DbId) -> Result<AnalysisRun, ApiError> {
        let response = self
            .send(self.client.get(self.url(&format!("qpadm/runs/{run_id}/"))))
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /qpadm/runs/`
    async fn fetch_history(&self) -> Result<serde_json::Value, ApiError> {
        let response = self.send(self.client.get(self.url("qpadm/runs/"))).await?;
        Self::parse_response(response).await
    }

    /// `GET /qpadm/status/`
    async fn fetch_usage(&self) -> Result<UsageStatus, ApiError> {
        let response = self.send(self.client.get(self.url("qpadm/status/"))).await?;
        Self::parse_response(response).await
    }

    /// `GET /qpadm/populations/?dataset=...`
    async fn fetch_catalog(&self, dataset: DatasetType) -> Result<PopulationCatalog, ApiError> {
        let request = self
            .client
            .get(self.url("qpadm/populations/"))
            .query(&[("dataset", dataset.as_str())]);
        let response = self.send(request).await?;
        Self::parse_response(response).await
    }
}

/// Pull the human-readable reason out of an error body.
///
/// Prefers a string `error` field, then a string `detail` field; falls
/// back to the trimmed raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty body>".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
