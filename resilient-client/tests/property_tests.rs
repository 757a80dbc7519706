//! Property-based tests for resilient-client.
//!
//! These tests verify invariants of backoff, retries, circuit breaking and
//! cache keys across generated inputs using proptest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use reqwest::Method;
use resilient_client::backoff::{
    BackoffStrategy, calculate_backoff, calculate_backoff_with_jitter,
};
use resilient_client::cache::{CacheStore, cache_key, glob_to_regex};
use resilient_client::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy, SdkError,
    SdkResult,
};

fn strategy() -> impl Strategy<Value = BackoffStrategy> {
    prop_oneof![
        Just(BackoffStrategy::Linear),
        Just(BackoffStrategy::Exponential),
        Just(BackoffStrategy::Fixed),
        Just(BackoffStrategy::None),
    ]
}

// Backoff delays are never negative, never exceed the cap, and are zero for
// the first attempt.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_backoff_within_bounds(
        attempt in 0u32..80,
        base_ms in 0u64..10_000,
        max_ms in 1u64..60_000,
        strategy in strategy(),
    ) {
        let max = Duration::from_millis(max_ms);
        let delay = calculate_backoff(attempt, Duration::from_millis(base_ms), Some(max), strategy);

        prop_assert!(delay <= max);
        if attempt <= 1 || strategy == BackoffStrategy::None {
            prop_assert_eq!(delay, Duration::ZERO);
        }
    }

    #[test]
    fn prop_jitter_stays_within_ten_percent(
        attempt in 2u32..10,
        base_ms in 100u64..5_000,
        jitter in -1.0f64..=1.0,
    ) {
        let base = Duration::from_millis(base_ms);
        let linear = BackoffStrategy::Linear;
        let exact = calculate_backoff_with_jitter(attempt, base, None, linear, 0.0);
        let jittered = calculate_backoff_with_jitter(attempt, base, None, linear, jitter);

        let exact_ms = exact.as_millis() as f64;
        let diff = (jittered.as_millis() as f64 - exact_ms).abs();
        prop_assert!(diff <= exact_ms * 0.1 + 1.0, "{} vs {}", jittered.as_millis(), exact_ms);
    }

    #[test]
    fn prop_exponential_doubles(attempt in 2u32..20, base_ms in 1u64..1_000) {
        let base = Duration::from_millis(base_ms);
        let exponential = BackoffStrategy::Exponential;
        let current = calculate_backoff_with_jitter(attempt, base, None, exponential, 0.0);
        let next = calculate_backoff_with_jitter(attempt + 1, base, None, exponential, 0.0);

        prop_assert_eq!(next, current * 2);
    }
}

// An operation that always fails is attempted exactly `max_attempts` times
// and the last error is returned.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_retry_exhaustion(max_attempts in 1u32..6) {
        tokio_test::block_on(async {
            let policy = RetryPolicy::new(
                RetryConfig::default()
                    .with_max_attempts(max_attempts)
                    .with_base_delay(Duration::from_millis(1))
                    .with_max_delay(Duration::from_millis(2)),
            );
            let calls = Arc::new(AtomicU32::new(0));

            let result: SdkResult<()> = policy
                .execute(|| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err(SdkError::network(format!("failure {n}"))) }
                })
                .await;

            assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            assert_eq!(result, Err(SdkError::network(format!("failure {max_attempts}"))));
            assert_eq!(policy.last_attempts().await.len(), max_attempts as usize);
        });
    }

    #[test]
    fn prop_breaker_trips_at_threshold(threshold in 1u32..10) {
        tokio_test::block_on(async {
            let cb = CircuitBreaker::new(
                "prop",
                CircuitBreakerConfig::default().with_failure_threshold(threshold),
            );

            for _ in 0..threshold - 1 {
                cb.record_failure().await;
                assert_eq!(cb.state().await, CircuitState::Closed);
                assert!(cb.can_execute().await);
            }

            cb.record_failure().await;
            assert_eq!(cb.state().await, CircuitState::Open);
            assert!(!cb.can_execute().await);
        });
    }
}

// Cache keys do not depend on the order query parameters were supplied in,
// and glob invalidation removes exactly the matching keys.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_cache_key_order_independent(
        params in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..6),
        path in "/[a-z]{1,10}",
    ) {
        let forward: Vec<(String, String)> = params.clone().into_iter().collect();
        let reverse: Vec<(String, String)> = params.into_iter().rev().collect();

        prop_assert_eq!(
            cache_key(&Method::GET, &path, &forward),
            cache_key(&Method::GET, &path, &reverse)
        );
    }

    #[test]
    fn prop_glob_prefix_invalidation(
        ids in proptest::collection::btree_set(0u32..1000, 1..20),
        others in proptest::collection::btree_set("[a-z]{1,8}", 0..10),
    ) {
        tokio_test::block_on(async {
            let store: CacheStore<u32> = CacheStore::new(Duration::from_secs(60), 10_000);
            for id in &ids {
                store.set(&format!("GET:/widgets/{id}"), *id, None).await.unwrap();
            }
            for other in &others {
                store.set(&format!("GET:/users/{other}"), 0, None).await.unwrap();
            }

            let removed = store.invalidate("GET:/widgets/*").await.unwrap();

            assert_eq!(removed, ids.len());
            assert_eq!(store.len().await, others.len());
        });
    }

    #[test]
    fn prop_glob_literal_matches_itself(key in "[A-Za-z0-9:/?&=._+()\\[\\]-]{1,40}") {
        let escaped: String = key.chars().filter(|c| *c != '*' && *c != '?').collect();
        prop_assume!(!escaped.is_empty());
        let matcher = glob_to_regex(&escaped).unwrap();
        prop_assert!(matcher.is_match(&escaped));
    }
}
