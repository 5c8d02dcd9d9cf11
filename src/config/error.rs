//! Configuration error types

use thiserror::Error;

use crate::domain::catalog::CatalogError;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Cannot read catalog overrides from {path}: {source}")]
    CatalogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog overrides: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("{field} must be at most {max}")]
    OutOfRange { field: &'static str, max: u64 },

    #[error("Retry max_backoff_ms is below initial_backoff_ms")]
    InvalidBackoff,

    #[error("Invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("Razorpay key_id and key_secret must be set together")]
    IncompleteGatewayCredentials,

    #[error("Invalid Razorpay key id format")]
    InvalidGatewayKey,

    #[error("Gateway API base URL must use HTTPS in production")]
    GatewayUrlMustBeHttps,
}
