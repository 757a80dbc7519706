//! Helpers shared by the end-to-end tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use resilient_client::{CacheConfig, ClientConfig, RetryConfig};

/// Client config pointed at `base_url` with millisecond retry delays.
#[must_use]
pub fn fast_config(base_url: &str) -> ClientConfig {
    ClientConfig::new(base_url)
        .with_timeout(Duration::from_secs(2))
        .with_retry(
            RetryConfig::default()
                .with_base_delay(Duration::from_millis(5))
                .with_max_delay(Duration::from_millis(20)),
        )
}

/// [`fast_config`] with the response cache enabled.
#[must_use]
pub fn cached_config(base_url: &str) -> ClientConfig {
    fast_config(base_url).with_cache(CacheConfig::enabled())
}

/// Send test logs to the test harness writer. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("resilient_client=debug")
        .with_test_writer()
        .try_init();
}
