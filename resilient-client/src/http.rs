//! reqwest client construction for the default transport.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};

/// User agent sent unless a `user-agent` default header overrides it.
pub const DEFAULT_USER_AGENT: &str = concat!("resilient-client/", env!("CARGO_PKG_VERSION"));

/// Connection settings of the pooled reqwest client.
///
/// `timeout` only caps a single exchange at the socket level; the API client
/// races each request against its own (possibly shorter) timeout.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Exchange ceiling (default: 30s)
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s)
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host (default: 10)
    pub max_idle_per_host: usize,
    /// TCP keepalive interval, if any (default: 60s)
    pub tcp_keepalive: Option<Duration>,
    /// User agent header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 10,
            tcp_keepalive: Some(Duration::from_secs(60)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    /// Set the exchange ceiling.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set idle pool retention.
    #[must_use]
    pub const fn with_pool(mut self, idle_timeout: Duration, max_idle_per_host: usize) -> Self {
        self.pool_idle_timeout = idle_timeout;
        self.max_idle_per_host = max_idle_per_host;
        self
    }

    /// Disable TCP keepalive.
    #[must_use]
    pub const fn without_keepalive(mut self) -> Self {
        self.tcp_keepalive = None;
        self
    }
}

impl From<&ClientConfig> for HttpConfig {
    fn from(config: &ClientConfig) -> Self {
        let user_agent = config
            .default_headers
            .iter()
            .find_map(|(name, value)| name.eq_ignore_ascii_case("user-agent").then_some(value));

        let http = Self::default().with_timeout(config.timeout);
        match user_agent {
            Some(agent) => http.with_user_agent(agent.clone()),
            None => http,
        }
    }
}

/// Build the pooled rustls client.
///
/// # Errors
///
/// Returns a `Configuration` error if reqwest rejects the settings or TLS
/// cannot be initialized.
///
/// # Examples
///
/// ```
/// use resilient_client::http::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let client = build_http_client(&HttpConfig::default().with_timeout(Duration::from_secs(5)));
/// assert!(client.is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> SdkResult<Client> {
    ClientBuilder::new()
        .use_rustls_tls()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .tcp_keepalive(config.tcp_keepalive)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| SdkError::configuration(format!("failed to build HTTP client: {e}")))
}
