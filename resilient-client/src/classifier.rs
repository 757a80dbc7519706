//! Error classification: category, severity, and recovery guidance.
//!
//! [`ErrorClassifier::classify`] turns an [`SdkError`] into a plain
//! [`ClassifiedError`] value that the retry loop and the façade inspect
//! instead of matching on error variants themselves.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffStrategy;
use crate::error::SdkError;

/// Handling category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection-level failure
    Network,
    /// Non-success HTTP response
    Http,
    /// Structured API error
    Api,
    /// Credentials rejected
    Authentication,
    /// Invalid request
    Validation,
    /// Client misconfiguration
    Configuration,
    /// Operation timed out
    Timeout,
    /// Server-side throttling
    RateLimit,
    /// Response cache failure
    Cache,
    /// Encoding or decoding failure
    Serialization,
    /// Domain rule violation
    BusinessLogic,
    /// Request rejected by an open circuit
    CircuitOpen,
}

impl ErrorCategory {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http => "http",
            Self::Api => "api",
            Self::Authentication => "authentication",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Cache => "cache",
            Self::Serialization => "serialization",
            Self::BusinessLogic => "business_logic",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Impact of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient or caller-correctable
    Low,
    /// Needs attention if it persists
    Medium,
    /// Requests will keep failing without intervention
    High,
    /// Client cannot operate
    Critical,
}

/// A recovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionKind {
    /// Retry the request as is
    Retry,
    /// Wait for the server hint, then retry
    WaitAndRetry,
    /// Refresh credentials and retry
    RefreshAuth,
    /// Drop cached data and refetch
    ClearCache,
    /// Serve a fallback value
    UseFallback,
    /// Sign in again
    ReAuthenticate,
    /// Correct the request payload
    FixInput,
    /// Review client configuration
    CheckConfiguration,
    /// Verify network reachability
    CheckConnectivity,
    /// Escalate to the service operator
    ContactSupport,
}

/// One recovery step with its estimated chance of success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    /// Step to take
    pub kind: RecoveryActionKind,
    /// Human readable description
    pub description: String,
    /// Estimated success probability in `[0, 1]`
    pub success_probability: f64,
}

impl RecoveryAction {
    fn new(kind: RecoveryActionKind, description: &str, success_probability: f64) -> Self {
        Self {
            kind,
            description: description.to_string(),
            success_probability,
        }
    }
}

/// Retry settings recommended for a failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecommendation {
    /// Suggested total attempts
    pub max_attempts: u32,
    /// Suggested base delay
    pub delay: Duration,
    /// Suggested backoff shape
    pub backoff: BackoffStrategy,
}

/// Recovery guidance for a failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Steps the client can take on its own
    pub automated: Vec<RecoveryAction>,
    /// Steps that need a human
    pub manual: Vec<RecoveryAction>,
    /// Retry settings, when retrying makes sense
    pub retry: Option<RetryRecommendation>,
}

/// A failure normalized into category, severity, and recovery guidance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    /// Handling category
    pub category: ErrorCategory,
    /// Impact
    pub severity: Severity,
    /// Whether retrying may succeed
    pub retryable: bool,
    /// Recovery guidance
    pub recovery: RecoveryStrategy,
    /// The failure itself
    pub underlying: SdkError,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{:?}] {}", self.category, self.severity, self.underlying)
    }
}

/// Maps errors to categories, severities, and recovery strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error.
    #[must_use]
    pub fn classify(error: &SdkError) -> ClassifiedError {
        ClassifiedError {
            category: Self::category(error),
            severity: Self::severity(error),
            retryable: Self::is_retryable(error),
            recovery: Self::recovery_strategy(error),
            underlying: error.clone(),
        }
    }

    /// Category of an error.
    #[must_use]
    pub const fn category(error: &SdkError) -> ErrorCategory {
        match error {
            SdkError::Network { .. } => ErrorCategory::Network,
            SdkError::Http { .. } => ErrorCategory::Http,
            SdkError::Api { .. } => ErrorCategory::Api,
            SdkError::Authentication { .. } => ErrorCategory::Authentication,
            SdkError::Validation { .. } => ErrorCategory::Validation,
            SdkError::Configuration(_) => ErrorCategory::Configuration,
            SdkError::Timeout { .. } => ErrorCategory::Timeout,
            SdkError::RateLimit { .. } => ErrorCategory::RateLimit,
            SdkError::Cache { .. } => ErrorCategory::Cache,
            SdkError::Serialization(_) => ErrorCategory::Serialization,
            SdkError::BusinessLogic { .. } => ErrorCategory::BusinessLogic,
            SdkError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
        }
    }

    /// Severity of an error.
    #[must_use]
    pub fn severity(error: &SdkError) -> Severity {
        match error {
            SdkError::Configuration(_) => Severity::Critical,
            SdkError::Authentication { .. } | SdkError::CircuitOpen { .. } => Severity::High,
            SdkError::Http { status, .. } | SdkError::Api { status, .. } if *status >= 500 => {
                Severity::High
            }
            SdkError::Timeout { .. } | SdkError::Validation { .. } | SdkError::Cache { .. } => {
                Severity::Low
            }
            _ => Severity::Medium,
        }
    }

    /// Whether retrying may succeed.
    #[must_use]
    pub fn is_retryable(error: &SdkError) -> bool {
        error.is_retryable()
    }

    /// Recovery guidance for an error.
    #[must_use]
    pub fn recovery_strategy(error: &SdkError) -> RecoveryStrategy {
        use RecoveryActionKind as K;

        match error {
            SdkError::Network { .. } => RecoveryStrategy {
                automated: vec![RecoveryAction::new(K::Retry, "Retry with backoff", 0.7)],
                manual: vec![RecoveryAction::new(
                    K::CheckConnectivity,
                    "Check network connectivity to the API host",
                    0.5,
                )],
                retry: Some(RetryRecommendation {
                    max_attempts: 3,
                    delay: Duration::from_millis(1000),
                    backoff: BackoffStrategy::Exponential,
                }),
            },
            SdkError::Timeout { .. } => RecoveryStrategy {
                automated: vec![RecoveryAction::new(K::Retry, "Retry the request", 0.6)],
                manual: vec![RecoveryAction::new(
                    K::CheckConfiguration,
                    "Increase the request timeout",
                    0.4,
                )],
                retry: Some(RetryRecommendation {
                    max_attempts: 3,
                    delay: Duration::from_millis(2000),
                    backoff: BackoffStrategy::Exponential,
                }),
            },
            SdkError::RateLimit { retry_after, .. } => RecoveryStrategy {
                automated: vec![RecoveryAction::new(
                    K::WaitAndRetry,
                    "Wait for the rate limit window to reset",
                    0.9,
                )],
                manual: vec![RecoveryAction::new(
                    K::ContactSupport,
                    "Request a higher rate limit",
                    0.3,
                )],
                retry: Some(RetryRecommendation {
                    max_attempts: 3,
                    delay: retry_after.unwrap_or(Duration::from_secs(60)),
                    backoff: BackoffStrategy::Linear,
                }),
            },
            SdkError::Authentication { .. } => RecoveryStrategy {
                automated: vec![RecoveryAction::new(
                    K::RefreshAuth,
                    "Refresh the access token",
                    0.8,
                )],
                manual: vec![RecoveryAction::new(K::ReAuthenticate, "Sign in again", 0.95)],
                retry: Some(RetryRecommendation {
                    max_attempts: 1,
                    delay: Duration::ZERO,
                    backoff: BackoffStrategy::None,
                }),
            },
            SdkError::Validation { .. } => RecoveryStrategy {
                automated: Vec::new(),
                manual: vec![RecoveryAction::new(
                    K::FixInput,
                    "Correct the request payload",
                    0.9,
                )],
                retry: None,
            },
            SdkError::Configuration(_) => RecoveryStrategy {
                automated: Vec::new(),
                manual: vec![RecoveryAction::new(
                    K::CheckConfiguration,
                    "Review client configuration",
                    0.9,
                )],
                retry: None,
            },
            SdkError::Cache { .. } => RecoveryStrategy {
                automated: vec![
                    RecoveryAction::new(K::ClearCache, "Clear the response cache", 0.8),
                    RecoveryAction::new(K::Retry, "Bypass the cache and refetch", 0.9),
                ],
                manual: Vec::new(),
                retry: Some(RetryRecommendation {
                    max_attempts: 2,
                    delay: Duration::ZERO,
                    backoff: BackoffStrategy::None,
                }),
            },
            SdkError::CircuitOpen { retry_in, .. } => RecoveryStrategy {
                automated: vec![
                    RecoveryAction::new(K::UseFallback, "Serve a fallback response", 0.6),
                    RecoveryAction::new(
                        K::WaitAndRetry,
                        "Retry after the circuit reset timeout",
                        0.5,
                    ),
                ],
                manual: vec![RecoveryAction::new(
                    K::ContactSupport,
                    "Report the service outage",
                    0.3,
                )],
                retry: Some(RetryRecommendation {
                    max_attempts: 1,
                    delay: retry_in.unwrap_or(Duration::from_secs(60)),
                    backoff: BackoffStrategy::Fixed,
                }),
            },
            SdkError::Http { status, .. } | SdkError::Api { status, .. }
                if error.is_retryable() =>
            {
                RecoveryStrategy {
                    automated: vec![RecoveryAction::new(K::Retry, "Retry with backoff", 0.6)],
                    manual: vec![RecoveryAction::new(
                        K::ContactSupport,
                        "Contact support if the server error persists",
                        0.3,
                    )],
                    retry: Some(RetryRecommendation {
                        max_attempts: 3,
                        delay: Duration::from_millis(if *status == 503 { 5000 } else { 1000 }),
                        backoff: BackoffStrategy::Exponential,
                    }),
                }
            }
            SdkError::Http { .. }
            | SdkError::Api { .. }
            | SdkError::Serialization(_)
            | SdkError::BusinessLogic { .. } => RecoveryStrategy {
                automated: Vec::new(),
                manual: vec![RecoveryAction::new(
                    K::ContactSupport,
                    "Contact support with the request id",
                    0.5,
                )],
                retry: None,
            },
        }
    }
}
