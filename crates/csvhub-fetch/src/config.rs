//! Fetcher configuration and builder pattern.

use csvhub_core::{CatalogError, Result};
use std::time::Duration;

/// Default hard timeout for one remote request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on a remote response body (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Configuration for the external fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Request timeout covering connect, headers and body (default: 10 seconds)
    pub timeout: Duration,
    /// Largest response body accepted, in bytes
    pub max_body_bytes: usize,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: format!("csvhub-fetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetcherConfig {
    /// Create a new configuration builder.
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::default()
    }

    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.timeout < Self::MIN_TIMEOUT {
            return Err(CatalogError::ValidationError(format!(
                "fetch timeout ({:?}) must be >= {:?}",
                self.timeout,
                Self::MIN_TIMEOUT
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(CatalogError::ValidationError(
                "max_body_bytes must be > 0".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(CatalogError::ValidationError(
                "user_agent cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for fetcher configuration.
#[derive(Debug, Default)]
pub struct FetcherConfigBuilder {
    config: FetcherConfig,
}

impl FetcherConfigBuilder {
    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the response body cap.
    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.config.max_body_bytes = max_body_bytes;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<FetcherConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FetcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_body_bytes, 32 * 1024 * 1024);
        assert!(config.user_agent.starts_with("csvhub-fetch/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_tiny_timeout() {
        let err = FetcherConfig::builder()
            .timeout(Duration::from_millis(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::ValidationError(_)));
    }

    #[test]
    fn test_builder_rejects_zero_body_cap() {
        assert!(FetcherConfig::builder().max_body_bytes(0).build().is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = FetcherConfig::builder()
            .timeout(Duration::from_secs(3))
            .max_body_bytes(1024)
            .user_agent("tests/1.0")
            .build()
            .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.user_agent, "tests/1.0");
    }
}
