//! Shared proptest generators.

use std::time::Duration;

use proptest::prelude::*;
use resilient_client::backoff::BackoffStrategy;
use resilient_client::{RetryConfig, SdkError};

/// Generate any backoff strategy.
pub fn backoff_strategy() -> impl Strategy<Value = BackoffStrategy> {
    prop_oneof![
        Just(BackoffStrategy::Linear),
        Just(BackoffStrategy::Exponential),
        Just(BackoffStrategy::Fixed),
        Just(BackoffStrategy::None),
    ]
}

/// Generate status codes retried by default.
pub fn retryable_status() -> impl Strategy<Value = u16> {
    prop::sample::select(vec![408u16, 429, 500, 502, 503, 504])
}

/// Generate client error status codes that are never retried.
pub fn non_retryable_status() -> impl Strategy<Value = u16> {
    prop::sample::select(vec![400u16, 401, 403, 404, 409, 422])
}

/// Generate errors the default retry condition retries.
pub fn retryable_error() -> impl Strategy<Value = SdkError> {
    prop_oneof![
        "[a-z ]{1,30}".prop_map(SdkError::network),
        (1u64..60_000).prop_map(|ms| SdkError::timeout("GET /x", Duration::from_millis(ms))),
        prop::option::of(1u64..120).prop_map(|secs| SdkError::RateLimit {
            message: "slow down".to_string(),
            retry_after: secs.map(Duration::from_secs),
        }),
        retryable_status()
            .prop_filter("429 maps to RateLimit", |s| *s != 429)
            .prop_map(|status| SdkError::Http {
                status,
                message: "upstream".to_string(),
                body: None,
                url: None,
            }),
    ]
}

/// Generate errors the default retry condition never retries.
pub fn non_retryable_error() -> impl Strategy<Value = SdkError> {
    prop_oneof![
        "[a-z ]{1,30}".prop_map(SdkError::validation),
        "[a-z ]{1,30}".prop_map(SdkError::authentication),
        "[a-z ]{1,30}".prop_map(SdkError::configuration),
        ("[A-Z_]{3,12}", "[a-z ]{1,30}").prop_map(|(code, msg)| SdkError::business(code, msg)),
        non_retryable_status().prop_map(|status| SdkError::Http {
            status,
            message: "client error".to_string(),
            body: None,
            url: None,
        }),
    ]
}

/// Generate query parameter lists, possibly with repeated keys.
pub fn query_params() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,8}"), 0..8)
}

/// Generate fast retry configurations.
pub fn retry_config() -> impl Strategy<Value = RetryConfig> {
    (1u32..6, backoff_strategy(), 0u64..5).prop_map(|(attempts, backoff, base_ms)| {
        RetryConfig::default()
            .with_max_attempts(attempts)
            .with_backoff(backoff)
            .with_base_delay(Duration::from_millis(base_ms))
            .with_max_delay(Duration::from_millis(10))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_retryable_errors_generated(err in retryable_error()) {
            prop_assert!(err.is_retryable(), "{err:?}");
        }

        #[test]
        fn test_non_retryable_errors_generated(err in non_retryable_error()) {
            prop_assert!(!err.is_retryable(), "{err:?}");
        }

        #[test]
        fn test_retry_config_is_valid(config in retry_config()) {
            prop_assert!(config.validate().is_ok());
        }
    }
}
