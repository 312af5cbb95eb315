//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::bureau::RetryConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// `json` or `text`
    pub log_format: String,

    pub bureau_max_retries: u32,
    pub bureau_retry_backoff: Duration,

    /// Deadline given to a single credit score lookup
    pub bureau_timeout: Duration,

    /// Attempts per use case when a save hits a concurrency conflict
    pub save_max_attempts: u32,

    pub outbox_relay_interval: Duration,
    pub outbox_relay_batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: setting(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
            host: setting(&lookup, "HOST", "127.0.0.1")?,
            port: setting(&lookup, "PORT", "3000")?,
            environment: setting(&lookup, "ENVIRONMENT", "development")?,
            log_format: setting(&lookup, "LOG_FORMAT", "text")?,
            bureau_max_retries: setting(&lookup, "BUREAU_MAX_RETRIES", "3")?,
            bureau_retry_backoff: Duration::from_millis(setting(
                &lookup,
                "BUREAU_RETRY_BACKOFF_MS",
                "200",
            )?),
            bureau_timeout: Duration::from_secs(setting(&lookup, "BUREAU_TIMEOUT_SECS", "10")?),
            save_max_attempts: setting(&lookup, "SAVE_MAX_ATTEMPTS", "3")?,
            outbox_relay_interval: Duration::from_millis(setting(
                &lookup,
                "OUTBOX_RELAY_INTERVAL_MS",
                "1000",
            )?),
            outbox_relay_batch_size: setting(&lookup, "OUTBOX_RELAY_BATCH_SIZE", "100")?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn bureau_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.bureau_max_retries,
            backoff: self.bureau_retry_backoff,
        }
    }
}

fn setting<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => default.parse().map_err(|_| ConfigError::InvalidValue(name)),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/bank")])).unwrap();

        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.port, 3000);
        assert_eq!(config.bureau_max_retries, 3);
        assert_eq!(config.bureau_retry_backoff, Duration::from_millis(200));
        assert_eq!(config.bureau_timeout, Duration::from_secs(10));
        assert_eq!(config.save_max_attempts, 3);
        assert_eq!(config.outbox_relay_interval, Duration::from_millis(1000));
        assert_eq!(config.outbox_relay_batch_size, 100);
        assert!(!config.json_logs());
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("PORT")));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("LOG_FORMAT", "JSON"),
            ("BUREAU_MAX_RETRIES", "5"),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();
        assert!(config.json_logs());
        assert!(config.is_production());
        assert_eq!(config.bureau_retry().max_retries, 5);
    }
}
