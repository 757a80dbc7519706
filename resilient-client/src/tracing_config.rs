//! Log subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "resilient-client".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl From<&ClientConfig> for TracingConfig {
    fn from(config: &ClientConfig) -> Self {
        let level = if config.debug {
            "resilient_client=debug,info"
        } else {
            "info"
        };
        Self::default().with_log_level(level)
    }
}

impl TracingConfig {
    /// Create config with custom service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`.
///
/// # Errors
///
/// Returns a `Configuration` error if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> SdkResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    installed.map_err(|e| SdkError::configuration(format!("tracing already initialized: {e}")))?;

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "resilient-client");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_service_name("orders-sdk")
            .with_log_level("debug")
            .with_json_output();

        assert_eq!(config.service_name, "orders-sdk");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_output);
    }

    #[test]
    fn test_debug_client_config_raises_level() {
        let config = TracingConfig::from(&ClientConfig::default().with_debug());
        assert!(config.log_level.contains("resilient_client=debug"));

        let quiet = TracingConfig::from(&ClientConfig::default());
        assert_eq!(quiet.log_level, "info");
    }

    #[test]
    fn test_second_init_fails() {
        let config = TracingConfig::default().with_log_level("warn");
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
