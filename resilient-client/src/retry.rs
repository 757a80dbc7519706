//! Retry policy with configurable backoff and circuit breaking.
//!
//! This module provides a configurable retry mechanism for handling
//! transient failures. Each failed attempt is classified, logged to the
//! per-call attempt log, and reported to the optional circuit breaker.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backoff::{BackoffStrategy, calculate_backoff};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::classifier::{ClassifiedError, ErrorClassifier};
use crate::error::{DEFAULT_RETRYABLE_STATUS_CODES, SdkError, SdkResult};

/// Caller-supplied retry predicate, given the classified error and the
/// 1-based attempt that just failed.
pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError, u32) -> bool + Send + Sync>;

/// Notification invoked before sleeping ahead of a retry.
pub type OnRetryCallback = Arc<dyn Fn(&ClassifiedError, u32, Duration) + Send + Sync>;

/// When a failed attempt is retried.
#[derive(Clone)]
pub enum RetryCondition {
    /// Retry every failure
    Always,
    /// Retry failures carrying a status in the configured status set
    OnStatus,
    /// Retry failures the classifier marks retryable
    OnError,
    /// Retry when the predicate returns `true`
    Custom(RetryPredicate),
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::OnStatus => f.write_str("OnStatus"),
            Self::OnError => f.write_str("OnError"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retry policy configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Retry decision rule
    pub condition: RetryCondition,
    /// Delay growth between attempts
    pub backoff: BackoffStrategy,
    /// Base delay fed to the backoff strategy
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Option<Duration>,
    /// Status codes retried under [`RetryCondition::OnStatus`]
    pub status_codes: Option<HashSet<u16>>,
    /// Per-attempt timeout
    pub timeout: Option<Duration>,
    /// Circuit breaker guarding the operation
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Retry notification hook
    pub on_retry: Option<OnRetryCallback>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("condition", &self.condition)
            .field("backoff", &self.backoff)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("status_codes", &self.status_codes)
            .field("timeout", &self.timeout)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            condition: RetryCondition::OnError,
            backoff: BackoffStrategy::Exponential,
            base_delay: Duration::from_millis(1000),
            max_delay: Some(Duration::from_secs(30)),
            status_codes: None,
            timeout: None,
            circuit_breaker: None,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a new retry config with a custom retry condition.
    #[must_use]
    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Create a new retry config with a custom predicate.
    #[must_use]
    pub fn with_custom_condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClassifiedError, u32) -> bool + Send + Sync + 'static,
    {
        self.condition = RetryCondition::Custom(Arc::new(predicate));
        self
    }

    /// Create a new retry config with a custom backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Create a new retry config with custom base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Create a new retry config retrying the given status codes.
    #[must_use]
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Create a new retry config with a per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create a new retry config guarded by a circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Create a new retry config with a retry notification hook.
    #[must_use]
    pub fn with_on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ClassifiedError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Check invariants.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error when `max_attempts` is zero.
    pub fn validate(&self) -> SdkResult<()> {
        if self.max_attempts == 0 {
            return Err(SdkError::configuration("retry max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Diagnostics for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt: u32,
    /// When the attempt started
    pub timestamp: DateTime<Utc>,
    /// Classified failure; `None` for the successful attempt
    pub error: Option<ClassifiedError>,
    /// Delay waited before this attempt
    pub delay: Duration,
}

/// Retry policy for executing operations with automatic retries.
pub struct RetryPolicy {
    config: RetryConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    last_attempts: RwLock<Vec<RetryAttempt>>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("circuit_breaker", &self.circuit_breaker)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Create a new retry policy for the `default` endpoint group.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self::for_endpoint("default", config)
    }

    /// Create a new retry policy whose circuit breaker (if configured) is
    /// named after the endpoint group it protects.
    #[must_use]
    pub fn for_endpoint(name: impl Into<String>, config: RetryConfig) -> Self {
        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|cb| Arc::new(CircuitBreaker::new(name, cb)));
        Self {
            config,
            circuit_breaker,
            last_attempts: RwLock::new(Vec::new()),
        }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Share an existing circuit breaker instead of the configured one.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// The policy configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The circuit breaker guarding this policy, if any.
    #[must_use]
    pub const fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Get the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Attempt log of the most recently finished `execute` call.
    pub async fn last_attempts(&self) -> Vec<RetryAttempt> {
        self.last_attempts.read().await.clone()
    }

    /// Check if a failure should be retried under the configured condition.
    #[must_use]
    pub fn should_retry(&self, error: &ClassifiedError, attempt: u32) -> bool {
        match &self.config.condition {
            RetryCondition::Always => true,
            RetryCondition::OnStatus => error.underlying.status().is_some_and(|status| {
                self.config.status_codes.as_ref().map_or_else(
                    || DEFAULT_RETRYABLE_STATUS_CODES.contains(&status),
                    |codes| codes.contains(&status),
                )
            }),
            RetryCondition::OnError => error.retryable,
            RetryCondition::Custom(predicate) => predicate(error, attempt),
        }
    }

    /// Delay to wait before `attempt`, honoring a rate-limit hint.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, error: &SdkError) -> Duration {
        let delay = calculate_backoff(
            attempt,
            self.config.base_delay,
            self.config.max_delay,
            self.config.backoff,
        );
        match error {
            SdkError::RateLimit {
                retry_after: Some(hint),
                ..
            } => {
                let delay = delay.max(*hint);
                self.config.max_delay.map_or(delay, |max| delay.min(max))
            }
            _ => delay,
        }
    }

    /// Execute an async operation with retries.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` without running the operation when the breaker
    /// rejects the call, otherwise the last error once retries stop.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> SdkResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SdkResult<T>>,
    {
        self.execute_with_attempts(operation).await.0
    }

    /// Execute an async operation with retries, returning the attempt log of
    /// this call alongside the result. The log also becomes
    /// [`last_attempts`](Self::last_attempts).
    pub async fn execute_with_attempts<F, Fut, T>(
        &self,
        operation: F,
    ) -> (SdkResult<T>, Vec<RetryAttempt>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SdkResult<T>>,
    {
        let (result, attempts) = self.run(operation).await;
        self.last_attempts.write().await.clone_from(&attempts);
        (result, attempts)
    }

    async fn run<F, Fut, T>(&self, mut operation: F) -> (SdkResult<T>, Vec<RetryAttempt>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SdkResult<T>>,
    {
        let mut attempts = Vec::new();

        if let Some(cb) = &self.circuit_breaker {
            if !cb.can_execute().await {
                let retry_in = cb.next_attempt_in().await;
                warn!(breaker = cb.name(), "Circuit open, rejecting request");
                return (Err(SdkError::circuit_open(cb.name(), retry_in)), attempts);
            }
        }

        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        let mut delay = Duration::ZERO;

        loop {
            let timestamp = Utc::now();
            let outcome = match self.config.timeout {
                Some(limit) => tokio::time::timeout(limit, operation())
                    .await
                    .unwrap_or_else(|_| Err(SdkError::timeout("operation", limit))),
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    if let Some(cb) = &self.circuit_breaker {
                        cb.record_success().await;
                    }
                    attempts.push(RetryAttempt {
                        attempt,
                        timestamp,
                        error: None,
                        delay,
                    });
                    return (Ok(value), attempts);
                }
                Err(error) => error,
            };

            let classified = ErrorClassifier::classify(&error);
            attempts.push(RetryAttempt {
                attempt,
                timestamp,
                error: Some(classified.clone()),
                delay,
            });
            if let Some(cb) = &self.circuit_breaker {
                cb.record_failure().await;
            }

            if attempt >= max_attempts || !self.should_retry(&classified, attempt) {
                debug!(
                    attempt,
                    category = %classified.category,
                    "Giving up on operation"
                );
                return (Err(error.with_retry_count(attempt - 1)), attempts);
            }

            delay = self.delay_for_attempt(attempt + 1, &error);
            self.notify_retry(&classified, attempt, delay);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                category = %classified.category,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn notify_retry(&self, error: &ClassifiedError, attempt: u32, delay: Duration) {
        if let Some(callback) = &self.config.on_retry {
            if catch_unwind(AssertUnwindSafe(|| callback(error, attempt, delay))).is_err() {
                warn!(attempt, "on_retry callback panicked; ignoring");
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}
