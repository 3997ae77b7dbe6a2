//! Access-token seam.
//!
//! Tokens are issued and refreshed by an external auth service. The client
//! only asks for the current token before each request; a missing or
//! expired token simply surfaces as an HTTP error from the backend.

use async_trait::async_trait;

/// Source of bearer tokens for authenticated requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, or `None` to send the request unauthenticated.
    async fn access_token(&self) -> Option<String>;
}

/// A fixed token, typically read from `QPADM_API_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}
