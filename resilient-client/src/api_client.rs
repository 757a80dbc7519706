//! Single-attempt API request execution.
//!
//! [`ApiClient`] builds one HTTP exchange from an [`ApiRequest`], attaches
//! default and auth headers, enforces the request timeout, and normalizes the
//! outcome into an [`ApiResponse`] or a typed [`SdkError`]. It never retries;
//! that is the job of the retry policy wrapped around it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{AuthProvider, RequestContext};
use crate::config::ClientConfig;
use crate::envelope::ApiResponse;
use crate::error::{ErrorFactory, SdkError, SdkResult};
use crate::transport::{RequestBody, RequestInit, Transport};

/// Header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A logical API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the base URL; may carry its own query string
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Optional body
    pub body: Option<RequestBody>,
    /// Extra headers for this request
    pub headers: HashMap<String, String>,
    /// Overrides the client timeout
    pub timeout: Option<Duration>,
    /// Bypass the response cache
    pub skip_cache: bool,
    /// Overrides the cache default TTL
    pub cache_ttl: Option<Duration>,
}

impl ApiRequest {
    /// Create a request.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HashMap::new(),
            timeout: None,
            skip_cache: false,
            cache_ttl: None,
        }
    }

    /// Create a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a PATCH request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Create a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error if `body` cannot be encoded.
    pub fn json<B: serde::Serialize>(mut self, body: &B) -> SdkResult<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Set a raw body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bypass the response cache.
    #[must_use]
    pub const fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    /// Override the cache TTL for this response.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Executes single API requests over a [`Transport`].
pub struct ApiClient {
    base_url: Url,
    timeout: Duration,
    default_headers: HashMap<String, String>,
    transport: Arc<dyn Transport>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl ApiClient {
    /// Create an API client.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the base URL is invalid.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        auth: Option<Arc<dyn AuthProvider>>,
    ) -> SdkResult<Self> {
        Ok(Self {
            base_url: config.parsed_base_url()?,
            timeout: config.timeout,
            default_headers: config.default_headers.clone(),
            transport,
            auth,
        })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path and query against the base URL.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the result is not a valid URL.
    pub fn build_url(&self, path: &str, query: &[(String, String)]) -> SdkResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Perform one attempt of `request`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the exchange exceeds the timeout, the
    /// transport's error when it fails, and a response-derived error for
    /// non-success statuses.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: &ApiRequest) -> SdkResult<ApiResponse<serde_json::Value>> {
        let url = self.build_url(&request.path, &request.query)?;
        let headers = self.headers_for(request).await?;
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let timeout = request.timeout.unwrap_or(self.timeout);

        let init = RequestInit {
            method: request.method.clone(),
            headers,
            body: request.body.clone(),
        };

        debug!(url = %url, request_id, "Sending request");
        let response = tokio::time::timeout(timeout, self.transport.send(&url, init))
            .await
            .map_err(|_| {
                SdkError::timeout(format!("{} {}", request.method, request.path), timeout)
            })??;

        let status = response.status;
        let server_request_id = response
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or(request_id, String::from);
        debug!(status = status.as_u16(), request_id = %server_request_id, "Received response");

        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse::success(None, server_request_id));
        }

        if status.is_success() {
            let envelope = ApiResponse::from_body(&response.body, server_request_id)?;
            if envelope.success {
                return Ok(envelope);
            }
            return Err(match envelope.into_result() {
                Err(SdkError::Api {
                    code,
                    message,
                    details,
                    request_id,
                    retry_count,
                    ..
                }) => SdkError::Api {
                    status: status.as_u16(),
                    code,
                    message,
                    details,
                    request_id,
                    retry_count,
                },
                Err(other) => other,
                Ok(_) => SdkError::Serialization("inconsistent response envelope".to_string()),
            });
        }

        let error = ErrorFactory::from_response(
            status,
            &response.headers,
            &response.body,
            Some(url.as_str()),
        );

        if status == StatusCode::UNAUTHORIZED {
            self.notify_auth_failure(&error, &request.method, &url).await;
        }

        Err(error)
    }

    async fn headers_for(&self, request: &ApiRequest) -> SdkResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(content_type) = request.body.as_ref().and_then(RequestBody::content_type) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        insert_all(&mut headers, &self.default_headers)?;
        insert_all(&mut headers, &request.headers)?;

        if let Some(auth) = &self.auth {
            if let Some(auth_headers) = auth.auth_headers().await? {
                insert_all(&mut headers, &auth_headers)?;
            }
        }

        if !headers.contains_key(REQUEST_ID_HEADER) {
            let id = uuid::Uuid::new_v4().to_string();
            headers.insert(
                HeaderName::from_static(REQUEST_ID_HEADER),
                HeaderValue::from_str(&id)
                    .map_err(|e| SdkError::configuration(format!("invalid request id: {e}")))?,
            );
        }

        Ok(headers)
    }

    async fn notify_auth_failure(&self, error: &SdkError, method: &Method, url: &Url) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        let error = error.clone();
        let context = RequestContext {
            method: method.clone(),
            url: url.to_string(),
            status: StatusCode::UNAUTHORIZED.as_u16(),
        };

        // Own task, so a panicking hook cannot unwind the caller.
        let hook = tokio::spawn(async move { auth.on_auth_failure(&error, &context).await });
        match hook.await {
            Ok(Ok(())) => {}
            Ok(Err(hook_error)) => {
                warn!(error = %hook_error, "on_auth_failure hook failed; ignoring");
            }
            Err(join_error) => {
                warn!(error = %join_error, "on_auth_failure hook panicked; ignoring");
            }
        }
    }
}

fn insert_all(headers: &mut HeaderMap, extra: &HashMap<String, String>) -> SdkResult<()> {
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SdkError::configuration(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SdkError::configuration(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(())
}
