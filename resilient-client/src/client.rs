//! High-level HTTP client.
//!
//! [`HttpClient`] ties the pieces together: a cache lookup for cacheable
//! requests, then the retry policy (and its circuit breaker) around a single
//! [`ApiClient`] attempt, then a cache write on success. Terminal failures
//! are classified and logged before they are returned.
//!
//! # Example
//!
//! ```no_run
//! use resilient_client::{ClientConfig, HttpClient};
//!
//! # async fn run() -> resilient_client::SdkResult<()> {
//! let client = HttpClient::from_config(ClientConfig::new("https://api.example.com"))?;
//! let widgets = client.get::<Vec<serde_json::Value>>("/widgets").await?;
//! println!("{:?}", widgets.data);
//! client.dispose();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::api_client::{ApiClient, ApiRequest};
use crate::auth::AuthProvider;
use crate::cache::{CacheManager, cache_key};
use crate::classifier::{ErrorClassifier, Severity};
use crate::config::ClientConfig;
use crate::envelope::ApiResponse;
use crate::error::{SdkError, SdkResult};
use crate::http::HttpConfig;
use crate::metrics::ClientMetrics;
use crate::retry::RetryPolicy;
use crate::transport::{ReqwestTransport, Transport};

/// Resilient API client.
pub struct HttpClient {
    config: ClientConfig,
    api: ApiClient,
    retry: RetryPolicy,
    cache: Option<CacheManager<ApiResponse<Value>>>,
    metrics: ClientMetrics,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("retry", &self.retry)
            .field("cache_enabled", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client over the given transport.
    ///
    /// Must be called inside a Tokio runtime when the cache is enabled,
    /// because the cache sweep task starts here.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an invalid config and a `Cache`
    /// error if the sweep task cannot start.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        auth: Option<Arc<dyn AuthProvider>>,
    ) -> SdkResult<Self> {
        config.validate()?;

        let api = ApiClient::new(&config, transport, auth)?;
        let retry = RetryPolicy::for_endpoint(config.endpoint_group.clone(), config.retry.clone());
        let cache = if config.cache.enabled {
            Some(CacheManager::new(&config.cache)?)
        } else {
            None
        };

        Ok(Self {
            config,
            api,
            retry,
            cache,
            metrics: ClientMetrics::default(),
        })
    }

    /// Create a client over the default reqwest transport.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::new`].
    pub fn from_config(config: ClientConfig) -> SdkResult<Self> {
        let transport = ReqwestTransport::new(&HttpConfig::from(&config))?;
        Self::new(config, Arc::new(transport), None)
    }

    /// Create a client over the default reqwest transport with an auth provider.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::new`].
    pub fn with_auth(config: ClientConfig, auth: Arc<dyn AuthProvider>) -> SdkResult<Self> {
        let transport = ReqwestTransport::new(&HttpConfig::from(&config))?;
        Self::new(config, Arc::new(transport), Some(auth))
    }

    /// Execute a request.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` when the endpoint group is being protected,
    /// otherwise the last attempt's error once retries stop. Cache failures
    /// never fail the request.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> SdkResult<ApiResponse<T>> {
        self.metrics.requests.inc();

        let cached = self.cache.as_ref().filter(|_| {
            !request.skip_cache && self.config.cache.is_cacheable(&request.method)
        });
        let key = cached.map(|_| cache_key(&request.method, &request.path, &request.query));

        if let (Some(cache), Some(key)) = (cached, key.as_deref()) {
            if let Some(hit) = cache.get(key).await {
                self.metrics.cache_hits.inc();
                debug!(key, "Cache hit");
                return hit.decode();
            }
            self.metrics.cache_misses.inc();
        }

        let (result, attempts) = self
            .retry
            .execute_with_attempts(|| self.api.send(&request))
            .await;
        self.metrics
            .retries
            .inc_by(attempts.len().saturating_sub(1) as u64);

        let response = match result {
            Ok(response) => response,
            Err(error) => return Err(self.fail(error, attempts.len())),
        };

        if let (Some(cache), Some(key)) = (cached, key.as_deref()) {
            if let Err(e) = cache
                .set_response(
                    key,
                    response.clone(),
                    request.cache_ttl,
                    &request.method,
                    &request.path,
                )
                .await
            {
                warn!(key, error = %e, "Failed to cache response");
            }
            self.metrics.cache_size.set(cache.len().await as u64);
        }

        response.decode()
    }

    fn fail(&self, error: SdkError, attempts: usize) -> SdkError {
        self.metrics.failures.inc();
        if error.is_circuit_open() {
            self.metrics.circuit_rejections.inc();
        }

        let classified = ErrorClassifier::classify(&error);
        match classified.severity {
            Severity::High | Severity::Critical => error!(
                attempts,
                category = %classified.category,
                retryable = classified.retryable,
                error = %error,
                "Request failed"
            ),
            Severity::Low | Severity::Medium => warn!(
                attempts,
                category = %classified.category,
                retryable = classified.retryable,
                error = %error,
                "Request failed"
            ),
        }
        error
    }

    /// GET `path`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::execute`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> SdkResult<ApiResponse<T>> {
        self.execute(ApiRequest::get(path)).await
    }

    /// POST a JSON `body` to `path`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::execute`].
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SdkResult<ApiResponse<T>> {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    /// PUT a JSON `body` to `path`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::execute`].
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SdkResult<ApiResponse<T>> {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    /// PATCH `path` with a JSON `body`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::execute`].
    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SdkResult<ApiResponse<T>> {
        self.execute(ApiRequest::patch(path).json(body)?).await
    }

    /// DELETE `path`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::execute`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> SdkResult<ApiResponse<T>> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Evict cached responses whose key matches the glob `pattern`
    /// (e.g. `GET:/widgets*`). Returns the number of evicted entries;
    /// failures are logged and count as zero.
    pub async fn invalidate_cache(&self, pattern: &str) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        let evicted = cache.invalidate(pattern).await.unwrap_or_else(|e| {
            warn!(pattern, error = %e, "Cache invalidation failed");
            0
        });
        self.metrics.cache_size.set(cache.len().await as u64);
        evicted
    }

    /// Evict every cached response.
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
            self.metrics.cache_size.set(0);
        }
    }

    /// Stop background work. The client stays usable; expired cache entries
    /// are then only purged on read.
    pub fn dispose(&self) {
        if let Some(cache) = &self.cache {
            cache.dispose();
        }
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Retry policy shared by all requests of this client.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Response cache, when enabled.
    #[must_use]
    pub const fn cache(&self) -> Option<&CacheManager<ApiResponse<Value>>> {
        self.cache.as_ref()
    }

    /// Request counters.
    #[must_use]
    pub const fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }
}
