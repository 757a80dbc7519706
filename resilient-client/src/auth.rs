//! Auth header provider capability.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{SdkError, SdkResult};

/// Identity of the request that triggered an auth failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    /// HTTP status that triggered the hook
    pub status: u16,
}

/// Supplies authentication headers for outgoing requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to attach to the next request, or `None` for anonymous requests.
    async fn auth_headers(&self) -> SdkResult<Option<HashMap<String, String>>>;

    /// Called after the server answered 401. Failures are logged and ignored
    /// by the caller.
    async fn on_auth_failure(&self, _error: &SdkError, _request: &RequestContext) -> SdkResult<()> {
        Ok(())
    }
}

/// Sends a static bearer token.
pub struct BearerTokenProvider {
    token: SecretString,
}

impl BearerTokenProvider {
    /// Create a provider for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

impl std::fmt::Debug for BearerTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenProvider")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for BearerTokenProvider {
    async fn auth_headers(&self) -> SdkResult<Option<HashMap<String, String>>> {
        let token = self.token.expose_secret();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(HashMap::from([(
            "authorization".to_string(),
            format!("Bearer {token}"),
        )])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bearer_headers() {
        let provider = BearerTokenProvider::new("abc123");
        let headers = provider.auth_headers().await.unwrap().unwrap();
        assert_eq!(headers["authorization"], "Bearer abc123");
    }

    #[tokio::test]
    async fn test_empty_token_is_anonymous() {
        let provider = BearerTokenProvider::new("");
        assert!(provider.auth_headers().await.unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = BearerTokenProvider::new("abc123");
        assert!(!format!("{provider:?}").contains("abc123"));
    }
}
