//! Resilient request execution for HTTP API clients.
//!
//! This crate turns a logical API call into a reliable network operation:
//! - Typed error taxonomy with retryability and recovery classification
//! - Retry policies with linear, exponential and fixed backoff plus jitter
//! - Circuit breaker per endpoint group
//! - TTL response cache with glob invalidation and a background sweep
//! - Pluggable transport and auth header providers
//! - Prometheus-style client metrics and tracing setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api_client;
pub mod auth;
pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod tracing_config;
pub mod transport;

pub use api_client::{ApiClient, ApiRequest};
pub use auth::{AuthProvider, BearerTokenProvider, RequestContext};
pub use backoff::{BackoffStrategy, calculate_backoff};
pub use cache::{CacheItem, CacheManager, CacheStore, cache_key};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classifier::{ClassifiedError, ErrorCategory, ErrorClassifier, RecoveryStrategy, Severity};
pub use client::HttpClient;
pub use config::{CacheConfig, ClientConfig};
pub use envelope::{ApiErrorBody, ApiResponse};
pub use error::{ErrorFactory, SdkError, SdkResult};
pub use http::{HttpConfig, build_http_client};
pub use metrics::ClientMetrics;
pub use retry::{RetryAttempt, RetryConfig, RetryCondition, RetryPolicy};
pub use transport::{FormPart, RawResponse, RequestBody, RequestInit, ReqwestTransport, Transport};
