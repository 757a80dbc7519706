//! Client configuration.
//!
//! Every setting is optional and has a documented default. Values can also be
//! loaded from `RESILIENT_CLIENT_*` environment variables.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::error::{SdkError, SdkResult};
use crate::retry::RetryConfig;

/// Environment variable holding the API base URL.
pub const ENV_BASE_URL: &str = "RESILIENT_CLIENT_BASE_URL";
/// Environment variable holding the request timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "RESILIENT_CLIENT_TIMEOUT_MS";
/// Environment variable holding the retry attempt budget.
pub const ENV_MAX_ATTEMPTS: &str = "RESILIENT_CLIENT_MAX_ATTEMPTS";
/// Environment variable enabling the response cache.
pub const ENV_CACHE_ENABLED: &str = "RESILIENT_CLIENT_CACHE_ENABLED";
/// Environment variable enabling debug logging.
pub const ENV_DEBUG: &str = "RESILIENT_CLIENT_DEBUG";

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether responses are cached at all (default: false)
    pub enabled: bool,
    /// TTL used when a request does not set one (default: 5 min)
    pub default_ttl: Duration,
    /// Methods whose responses are cached (default: GET)
    pub cacheable_methods: Vec<Method>,
    /// Interval of the background expiry sweep (default: 60s)
    pub sweep_interval: Duration,
    /// Entry limit; the entry closest to expiry is evicted on overflow
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_ttl: Duration::from_secs(300),
            cacheable_methods: vec![Method::GET],
            sweep_interval: Duration::from_secs(60),
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    /// Create an enabled cache config.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Create config with custom TTL.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Create config with custom sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Create config with custom entry limit.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Whether responses to `method` are cached.
    #[must_use]
    pub fn is_cacheable(&self, method: &Method) -> bool {
        self.enabled && self.cacheable_methods.contains(method)
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL
    pub base_url: String,
    /// Per-request timeout (default: 30s)
    pub timeout: Duration,
    /// Headers sent with every request
    pub default_headers: HashMap<String, String>,
    /// Name of the endpoint group guarded by the circuit breaker
    pub endpoint_group: String,
    /// Retry policy (default: 3 attempts, exponential, 1000ms base)
    pub retry: RetryConfig,
    /// Response cache (default: disabled)
    pub cache: CacheConfig,
    /// Verbose request logging
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: Duration::from_secs(30),
            default_headers: HashMap::new(),
            endpoint_group: "api".to_string(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Create config for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `RESILIENT_CLIENT_*` environment variables,
    /// falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for malformed values.
    pub fn from_env() -> SdkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for malformed values.
    pub fn from_lookup<F>(lookup: F) -> SdkResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            config.timeout = Duration::from_millis(parse_var(ENV_TIMEOUT_MS, &ms)?);
        }
        if let Some(attempts) = lookup(ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse_var(ENV_MAX_ATTEMPTS, &attempts)?;
        }
        if let Some(enabled) = lookup(ENV_CACHE_ENABLED) {
            config.cache.enabled = parse_bool(ENV_CACHE_ENABLED, &enabled)?;
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            config.debug = parse_bool(ENV_DEBUG, &debug)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create config with custom timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Create config with custom endpoint group name.
    #[must_use]
    pub fn with_endpoint_group(mut self, name: impl Into<String>) -> Self {
        self.endpoint_group = name.into();
        self
    }

    /// Create config with custom retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Create config with custom cache settings.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Enable debug logging.
    #[must_use]
    pub const fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the URL is malformed or not http(s).
    pub fn parsed_base_url(&self) -> SdkResult<Url> {
        let url = Url::parse(&self.base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SdkError::configuration(format!(
                "unsupported base URL scheme: {other}"
            ))),
        }
    }

    /// Check invariants.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error describing the first violation.
    pub fn validate(&self) -> SdkResult<()> {
        self.parsed_base_url()?;
        self.retry.validate()?;
        if self.timeout.is_zero() {
            return Err(SdkError::configuration("timeout must be greater than zero"));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(SdkError::configuration("cache default_ttl must be greater than zero"));
        }
        if self.cache.enabled && self.cache.sweep_interval.is_zero() {
            return Err(SdkError::configuration("cache sweep_interval must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> SdkResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SdkError::configuration(format!("{name} has invalid value {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> SdkResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SdkError::configuration(format!(
            "{name} has invalid value {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cacheable_methods() {
        let disabled = CacheConfig::default();
        assert!(!disabled.is_cacheable(&Method::GET));

        let enabled = CacheConfig::enabled();
        assert!(enabled.is_cacheable(&Method::GET));
        assert!(!enabled.is_cacheable(&Method::POST));
        assert!(!enabled.is_cacheable(&Method::DELETE));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://example.com").validate().is_err());
        assert!(
            ClientConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::default()
                .with_retry(RetryConfig::default().with_max_attempts(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            (ENV_BASE_URL, "https://api.example.com/v1"),
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_CACHE_ENABLED, "true"),
        ]);
        let config =
            ClientConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();

        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.cache.enabled);
        assert!(!config.debug);
    }

    #[test]
    fn test_from_lookup_rejects_malformed() {
        let err = ClientConfig::from_lookup(|key| {
            (key == ENV_TIMEOUT_MS).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, SdkError::Configuration(_)));
    }
}
