//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Maximum command retries on concurrency conflict
    pub command_max_retries: u32,

    /// Projection batch size per fetch
    pub projection_batch_size: i64,

    /// Projection poll interval when no notifications arrive
    pub projection_poll_interval: Duration,

    /// Verification code lifetime (email/phone/OTP codes)
    pub verification_code_lifetime: Duration,

    /// Default region for phone normalization (ISO 3166-1 alpha-2)
    pub default_phone_region: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let command_max_retries = env::var("COMMAND_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("COMMAND_MAX_RETRIES"))?;

        let projection_batch_size = env::var("PROJECTION_BATCH_SIZE")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PROJECTION_BATCH_SIZE"))?;

        let poll_millis: u64 = env::var("PROJECTION_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PROJECTION_POLL_INTERVAL_MS"))?;

        let code_lifetime_secs: u64 = env::var("VERIFICATION_CODE_LIFETIME_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("VERIFICATION_CODE_LIFETIME_SECS"))?;

        let default_phone_region =
            env::var("DEFAULT_PHONE_REGION").unwrap_or_else(|_| "CH".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            command_max_retries,
            projection_batch_size,
            projection_poll_interval: Duration::from_millis(poll_millis),
            verification_code_lifetime: Duration::from_secs(code_lifetime_secs),
            default_phone_region,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
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
