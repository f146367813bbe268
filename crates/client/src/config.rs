//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPFRONT_API_URL` - Base URL of the storefront backend
//!   (e.g. `http://localhost:4000`); the `/api` prefix is added per request
//!
//! ## Optional
//! - `SHOPFRONT_HTTP_TIMEOUT_SECS` - Request timeout in seconds (default: 30)

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, without the `/api` prefix.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with the default timeout.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from a `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = std::env::var("SHOPFRONT_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SHOPFRONT_API_URL".to_string()))?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("SHOPFRONT_API_URL".to_string(), e.to_string())
            })?;

        let timeout = match std::env::var("SHOPFRONT_HTTP_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar(
                        "SHOPFRONT_HTTP_TIMEOUT_SECS".to_string(),
                        e.to_string(),
                    )
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_TIMEOUT,
        };

        Ok(Self { base_url, timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_timeout() {
        let config = ClientConfig::new(Url::parse("http://localhost:4000").expect("valid url"));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.base_url.as_str(), "http://localhost:4000/");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("SHOPFRONT_API_URL".to_string());
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SHOPFRONT_API_URL"
        );
    }
}
