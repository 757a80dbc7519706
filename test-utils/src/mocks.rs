//! Mock implementations for testing.
//!
//! [`MockTransport`] replays a script of responses and records every request
//! it receives; [`RecordingAuthProvider`] hands out a fixed bearer token and
//! records auth failure notifications.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use resilient_client::auth::{AuthProvider, RequestContext};
use resilient_client::transport::{RawResponse, RequestInit, Transport};
use resilient_client::{SdkError, SdkResult};
use tokio::sync::RwLock;
use url::Url;

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Answer with a response
    Reply {
        /// HTTP status
        status: u16,
        /// Response headers
        headers: Vec<(String, String)>,
        /// Body text
        body: String,
        /// Time to wait before answering
        delay: Duration,
    },
    /// Fail the exchange
    Fail(SdkError),
}

impl ScriptedResponse {
    /// A response with a status and body.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Reply {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// A 200 response with a JSON body.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self::status(200, value.to_string())
    }

    /// A transport-level failure.
    #[must_use]
    pub const fn error(error: SdkError) -> Self {
        Self::Fail(error)
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Reply { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Delay the response.
    #[must_use]
    pub fn with_delay(mut self, wait: Duration) -> Self {
        if let Self::Reply { delay, .. } = &mut self {
            *delay = wait;
        }
        self
    }
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
}

/// Transport that replays scripted responses in order.
///
/// Once the script is exhausted every request gets the fallback response
/// (200 with `{}` unless changed).
#[derive(Debug)]
pub struct MockTransport {
    script: RwLock<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
    requests: RwLock<Vec<RecordedRequest>>,
    calls: AtomicU32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            script: RwLock::new(VecDeque::new()),
            fallback: ScriptedResponse::status(200, "{}"),
            requests: RwLock::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }
}

impl MockTransport {
    /// Create a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that replays `script`.
    #[must_use]
    pub fn scripted(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: RwLock::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Replace the fallback response.
    #[must_use]
    pub fn with_fallback(mut self, fallback: ScriptedResponse) -> Self {
        self.fallback = fallback;
        self
    }

    /// Wrap in an `Arc`.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Append a response to the script.
    pub async fn push(&self, response: ScriptedResponse) {
        self.script.write().await.push_back(response);
    }

    /// Number of requests received.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// All requests received.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// The most recent request.
    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.read().await.last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, url: &Url, init: RequestInit) -> SdkResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(RecordedRequest {
            method: init.method,
            url: url.to_string(),
            headers: init.headers,
        });

        let next = self
            .script
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            ScriptedResponse::Fail(error) => Err(error),
            ScriptedResponse::Reply {
                status,
                headers,
                body,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let status = StatusCode::from_u16(status)
                    .map_err(|e| SdkError::network(format!("bad scripted status: {e}")))?;
                let mut header_map = HeaderMap::new();
                for (name, value) in headers {
                    let name = HeaderName::try_from(name)
                        .map_err(|e| SdkError::network(format!("bad scripted header: {e}")))?;
                    let value = HeaderValue::try_from(value)
                        .map_err(|e| SdkError::network(format!("bad scripted header: {e}")))?;
                    header_map.insert(name, value);
                }
                Ok(RawResponse {
                    status,
                    headers: header_map,
                    body,
                })
            }
        }
    }
}

/// Auth provider that records every auth failure it is told about.
#[derive(Debug, Default)]
pub struct RecordingAuthProvider {
    token: Option<String>,
    header_calls: AtomicU32,
    failures: RwLock<Vec<(SdkError, RequestContext)>>,
    fail_hook: bool,
}

impl RecordingAuthProvider {
    /// Create a provider that sends `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Make `on_auth_failure` return an error after recording the call.
    #[must_use]
    pub const fn failing_hook(mut self) -> Self {
        self.fail_hook = true;
        self
    }

    /// Number of times headers were requested.
    #[must_use]
    pub fn header_calls(&self) -> u32 {
        self.header_calls.load(Ordering::SeqCst)
    }

    /// Recorded auth failures.
    pub async fn failures(&self) -> Vec<(SdkError, RequestContext)> {
        self.failures.read().await.clone()
    }
}

#[async_trait]
impl AuthProvider for RecordingAuthProvider {
    async fn auth_headers(&self) -> SdkResult<Option<HashMap<String, String>>> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.as_ref().map(|token| {
            HashMap::from([("authorization".to_string(), format!("Bearer {token}"))])
        }))
    }

    async fn on_auth_failure(&self, error: &SdkError, request: &RequestContext) -> SdkResult<()> {
        self.failures
            .write()
            .await
            .push((error.clone(), request.clone()));
        if self.fail_hook {
            return Err(SdkError::authentication("refresh failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() -> RequestInit {
        RequestInit {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let transport = MockTransport::scripted([
            ScriptedResponse::status(503, "busy").with_header("retry-after", "1"),
            ScriptedResponse::error(SdkError::network("reset")),
        ]);
        let url = Url::parse("http://mock.test/a").unwrap();

        let first = transport.send(&url, init()).await.unwrap();
        assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(first.headers["retry-after"], "1");

        assert!(transport.send(&url, init()).await.is_err());

        let third = transport.send(&url, init()).await.unwrap();
        assert_eq!(third.status, StatusCode::OK);
        assert_eq!(third.body, "{}");

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_recording_auth_provider() {
        let provider = RecordingAuthProvider::bearer("t0k").failing_hook();
        let headers = provider.auth_headers().await.unwrap().unwrap();
        assert_eq!(headers["authorization"], "Bearer t0k");

        let context = RequestContext {
            method: Method::GET,
            url: "http://mock.test/a".to_string(),
            status: 401,
        };
        let result = provider
            .on_auth_failure(&SdkError::authentication("expired"), &context)
            .await;

        assert!(result.is_err());
        assert_eq!(provider.failures().await.len(), 1);
        assert_eq!(provider.header_calls(), 1);
    }
}
