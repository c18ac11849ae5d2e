//! Catalog configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `CATALOG_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; when neither is set the catalog runs on in-memory storage)
//! - `CATALOG_HOST` - Bind address (default: 127.0.0.1)
//! - `CATALOG_PORT` - Listen port (default: 3000)
//! - `CATALOG_UPLOADS_DIR` - Where resized photos are written (default: ./public/uploads)
//! - `CATALOG_IMAGE_WIDTH` - Width of stored photos in pixels (default: 800)
//! - `CATALOG_MAX_UPLOAD_BYTES` - Request body limit for uploads (default: 10 MiB)
//! - `CATALOG_STORAGE_TIMEOUT_SECS` - Per-call repository/blob timeout (default: 5)
//! - `CATALOG_IMAGE_TIMEOUT_SECS` - Whole image ingestion timeout (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::images::DEFAULT_IMAGE_WIDTH;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Catalog application configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory for uploaded photos
    pub uploads_dir: PathBuf,
    /// Width photos are resized to
    pub image_width: u32,
    /// Maximum request body size
    pub max_upload_bytes: usize,
    /// Timeout for each repository or blob store call
    pub storage_timeout: Duration,
    /// Timeout for a whole image ingestion
    pub image_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            uploads_dir: PathBuf::from("./public/uploads"),
            image_width: DEFAULT_IMAGE_WIDTH,
            max_upload_bytes: 10 * 1024 * 1024,
            storage_timeout: Duration::from_secs(5),
            image_timeout: Duration::from_secs(15),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);
        let defaults = Self::default();

        let database_url = env
            .optional("CATALOG_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from);

        Ok(Self {
            database_url,
            host: env.parse_or("CATALOG_HOST", defaults.host)?,
            port: env.parse_or("CATALOG_PORT", defaults.port)?,
            uploads_dir: env
                .optional("CATALOG_UPLOADS_DIR")
                .map_or(defaults.uploads_dir, PathBuf::from),
            image_width: env.parse_or("CATALOG_IMAGE_WIDTH", defaults.image_width)?,
            max_upload_bytes: env.parse_or("CATALOG_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            storage_timeout: env.seconds_or("CATALOG_STORAGE_TIMEOUT_SECS", defaults.storage_timeout)?,
            image_timeout: env.seconds_or("CATALOG_IMAGE_TIMEOUT_SECS", defaults.image_timeout)?,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// A set, non-blank variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    fn seconds_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.parse_or(key, default.as_secs())?;
        if secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be at least 1 second".to_string(),
            ));
        }
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CatalogConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CatalogConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.uploads_dir, PathBuf::from("./public/uploads"));
        assert_eq!(config.image_width, 800);
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert_eq!(config.storage_timeout, Duration::from_secs(5));
        assert_eq!(config.image_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://fallback")]).unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://fallback"
        );

        let config = load(&[
            ("DATABASE_URL", "postgres://fallback"),
            ("CATALOG_DATABASE_URL", "postgres://primary"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://primary"
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CATALOG_HOST", "0.0.0.0"),
            ("CATALOG_PORT", "8080"),
            ("CATALOG_IMAGE_WIDTH", "640"),
            ("CATALOG_STORAGE_TIMEOUT_SECS", "2"),
            ("SENTRY_DSN", "https://key@sentry.example/1"),
        ])
        .unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.image_width, 640);
        assert_eq!(config.storage_timeout, Duration::from_secs(2));
        assert!(config.sentry_dsn.is_some());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("CATALOG_PORT", "not-a-port"),
            ("CATALOG_HOST", "localhost:80"),
            ("CATALOG_IMAGE_TIMEOUT_SECS", "0"),
            ("CATALOG_MAX_UPLOAD_BYTES", "-1"),
        ] {
            let err = load(&[(key, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidEnvVar(k, _) if k == key),
                "{key}={value} gave {err}"
            );
        }
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("CATALOG_PORT", "  "), ("SENTRY_DSN", "")]).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.sentry_dsn.is_none());
    }
}
