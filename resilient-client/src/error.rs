//! Centralized error taxonomy for request execution.
//!
//! Every failure that leaves the client core is an [`SdkError`]. Variants are
//! grouped by *handling behavior* rather than by HTTP semantics, so callers
//! can decide what to do without inspecting status codes themselves.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;

use crate::envelope::ApiErrorBody;

/// Status codes that are retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Result type for client operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// Common error type for request execution.
///
/// Payloads are owned so the error is `Clone`; the retry log and the
/// classifier keep their own copies of the underlying failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("Network error: {message}")]
    Network {
        /// Description of the failure
        message: String,
    },

    /// Non-success HTTP response without a decodable API error body
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Status text or raw body excerpt
        message: String,
        /// Raw response body, if any
        body: Option<String>,
        /// Request URL
        url: Option<String>,
    },

    /// Structured API error decoded from the response envelope
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Application error code
        code: String,
        /// Human readable message
        message: String,
        /// Additional error details
        details: Option<serde_json::Value>,
        /// Request identifier reported by the server
        request_id: Option<String>,
        /// Number of retries performed before surfacing
        retry_count: u32,
    },

    /// Credentials were missing, expired, or rejected
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of the failure
        message: String,
        /// HTTP status code, when the failure came from a response
        status: Option<u16>,
    },

    /// Request was rejected as invalid
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the failure
        message: String,
        /// Offending field, when known
        field: Option<String>,
        /// HTTP status code, when the failure came from a response
        status: Option<u16>,
    },

    /// Client is misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation did not complete in time
    #[error("Operation timed out after {}ms: {operation}", timeout.as_millis())]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Server asked the client to slow down
    #[error("Rate limited: {message}")]
    RateLimit {
        /// Description of the failure
        message: String,
        /// Server-provided wait hint
        retry_after: Option<Duration>,
    },

    /// Response cache operation failed
    #[error("Cache {operation} failed: {message}")]
    Cache {
        /// Cache operation name
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// Body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Domain rule violated by an otherwise valid request
    #[error("Business rule violated ({code}): {message}")]
    BusinessLogic {
        /// Rule identifier
        code: String,
        /// Description of the violation
        message: String,
    },

    /// Circuit breaker rejected the request before any network attempt
    #[error("Circuit breaker open for {service}")]
    CircuitOpen {
        /// Endpoint group protected by the breaker
        service: String,
        /// Time left until a trial request is admitted
        retry_in: Option<Duration>,
    },
}

impl SdkError {
    /// Check if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_client::SdkError;
    ///
    /// assert!(SdkError::network("connection reset").is_retryable());
    /// assert!(!SdkError::configuration("missing base url").is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimit { .. } => true,
            Self::Http { status, .. } | Self::Api { status, .. } => {
                DEFAULT_RETRYABLE_STATUS_CODES.contains(status)
            }
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Authentication { status, .. } | Self::Validation { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether this is a circuit-open rejection.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Create a network error.
    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a cache error.
    #[must_use]
    pub fn cache(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cache {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
            status: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication {
            message: msg.into(),
            status: None,
        }
    }

    /// Create a business logic error.
    #[must_use]
    pub fn business(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BusinessLogic {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Create a circuit open error for the given endpoint group.
    #[must_use]
    pub fn circuit_open(service: impl Into<String>, retry_in: Option<Duration>) -> Self {
        Self::CircuitOpen {
            service: service.into(),
            retry_in,
        }
    }

    /// Record how many retries preceded this error. Only `Api` errors carry it.
    #[must_use]
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        if let Self::Api { retry_count, .. } = &mut self {
            *retry_count = retries;
        }
        self
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration(format!("invalid URL: {err}"))
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        ErrorFactory::from_reqwest(&err, None)
    }
}

/// Builds [`SdkError`] values from raw transport outcomes.
pub struct ErrorFactory;

impl ErrorFactory {
    /// Map a non-success HTTP response into the taxonomy.
    ///
    /// The body is decoded as an API error envelope when possible; otherwise
    /// the raw text becomes the message.
    #[must_use]
    pub fn from_response(
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
        url: Option<&str>,
    ) -> SdkError {
        let code = status.as_u16();
        let api_error = ApiErrorBody::decode(body);
        let message = api_error.as_ref().map_or_else(
            || Self::text_message(status, body),
            |e| e.message.clone(),
        );

        match code {
            401 | 403 => SdkError::Authentication {
                message,
                status: Some(code),
            },
            429 => SdkError::RateLimit {
                message,
                retry_after: Self::retry_after(headers),
            },
            400 | 422 if api_error.is_some() => SdkError::Validation {
                field: api_error.as_ref().and_then(ApiErrorBody::field),
                message,
                status: Some(code),
            },
            _ => match api_error {
                Some(api) => SdkError::Api {
                    status: code,
                    code: api.code,
                    message: api.message,
                    details: api.details,
                    request_id: headers
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from),
                    retry_count: 0,
                },
                None => SdkError::Http {
                    status: code,
                    message,
                    body: (!body.is_empty()).then(|| body.to_string()),
                    url: url.map(String::from),
                },
            },
        }
    }

    /// Map a reqwest failure into the taxonomy.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout: Option<Duration>) -> SdkError {
        if err.is_timeout() {
            let operation = err
                .url()
                .map_or_else(|| "request".to_string(), ToString::to_string);
            return SdkError::timeout(operation, timeout.unwrap_or_default());
        }
        if err.is_decode() {
            return SdkError::Serialization(err.to_string());
        }
        if err.is_builder() {
            return SdkError::Configuration(err.to_string());
        }
        SdkError::network(err.to_string())
    }

    /// Parse a `Retry-After` header given in seconds.
    #[must_use]
    pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    fn text_message(status: StatusCode, body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            trimmed.chars().take(512).collect()
        }
    }
}
