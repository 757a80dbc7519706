//! Circuit breaker implementation for resilience.
//!
//! This module provides a circuit breaker that stops sending requests to an
//! endpoint group after repeated failures, then admits trial requests once a
//! cooldown has elapsed.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backoff::deadline_after;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, trial requests are allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures in closed state before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before transitioning from open to half-open
    pub reset_timeout: Duration,
    /// Number of successes in half-open state to close the circuit
    pub half_open_success_threshold: u32,
    /// Window after which an old failure no longer counts; `None` keeps
    /// failures until a success or an open/half-open cycle clears them
    pub monitoring_period: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 1,
            monitoring_period: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom reset timeout.
    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Create a new config with custom half-open success threshold.
    #[must_use]
    pub const fn with_half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = threshold;
        self
    }

    /// Create a new config with a rolling failure window.
    #[must_use]
    pub const fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = Some(period);
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
}

impl BreakerState {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            half_open_successes: 0,
            last_failure: None,
            next_attempt: None,
        }
    }
}

/// Circuit breaker for one endpoint group.
///
/// Implements the circuit breaker pattern with three states:
/// - Closed: Normal operation, requests are allowed
/// - Open: Failure threshold reached, requests are rejected until the reset timeout elapses
/// - Half-Open: Testing recovery; a success closes the circuit, a failure reopens it
///
/// All state lives behind a single lock so every transition is applied atomically.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerState::closed()),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Name of the protected endpoint group.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a request may proceed.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open and
    /// admits the request.
    pub async fn can_execute(&self) -> bool {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let ready = inner.next_attempt.is_none_or(|at| Instant::now() >= at);
                if ready {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!(breaker = %self.name, "Circuit half-open, admitting trial request");
                }
                ready
            }
        }
    }

    /// Record a successful request.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    *inner = BreakerState::closed();
                    info!(breaker = %self.name, "Circuit closed");
                }
            }
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    pub async fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.last_failure = Some(now);
                self.trip(&mut inner, now);
            }
            CircuitState::Closed => {
                let stale = match (self.config.monitoring_period, inner.last_failure) {
                    (Some(window), Some(last)) => now.duration_since(last) > window,
                    _ => false,
                };
                if stale {
                    inner.failures = 0;
                }
                inner.failures += 1;
                inner.last_failure = Some(now);
                if inner.failures >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                }
            }
            CircuitState::Open => {
                inner.last_failure = Some(now);
            }
        }
    }

    fn trip(&self, inner: &mut BreakerState, now: Instant) {
        inner.state = CircuitState::Open;
        inner.half_open_successes = 0;
        inner.next_attempt = Some(deadline_after(now, self.config.reset_timeout));
        warn!(
            breaker = %self.name,
            failures = inner.failures,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "Circuit opened"
        );
    }

    /// Get the current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Get the current failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.read().await.failures
    }

    /// Time left until an open circuit admits a trial request.
    pub async fn next_attempt_in(&self) -> Option<Duration> {
        let inner = self.inner.read().await;
        match inner.state {
            CircuitState::Open => inner
                .next_attempt
                .map(|at| at.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// Reset the circuit breaker to closed state.
    pub async fn reset(&self) {
        *self.inner.write().await = BreakerState::closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_reset_timeout(reset),
        )
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.can_execute().await);
    }

    #[tokio::test]
    async fn test_opens_after_failures() {
        let cb = breaker(3, Duration::from_secs(5));

        for _ in 0..3 {
            cb.record_failure().await;
        }

        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);
        assert!(cb.next_attempt_in().await.is_some());
    }

    #[tokio::test]
    async fn test_unbounded_reset_timeout_stays_open() {
        let cb = breaker(1, Duration::MAX);

        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);
        assert!(cb.next_attempt_in().await.unwrap() > Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let cb = breaker(3, Duration::from_secs(5));

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;

        assert_eq!(cb.failure_count().await, 0);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_transition() {
        let cb = breaker(2, Duration::from_millis(1));

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cb.can_execute().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let cb = breaker(2, Duration::from_millis(1));
        cb.record_failure().await;
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cb.can_execute().await);

        cb.record_success().await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_with_fresh_window() {
        let cb = breaker(2, Duration::from_millis(20));
        cb.record_failure().await;
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cb.can_execute().await);

        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);
        let remaining = cb.next_attempt_in().await.unwrap();
        assert!(remaining > Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_half_open_success_threshold() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::from_millis(1))
                .with_half_open_success_threshold(2),
        );
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cb.can_execute().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_monitoring_period_discards_stale_failures() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(2)
                .with_monitoring_period(Duration::from_millis(10)),
        );
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        cb.reset().await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
        assert!(cb.can_execute().await);
    }
}
