//! Error types

use std::time::Duration;

use thiserror::Error;

/// Price registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Exchange not registered: {0}")]
    UnknownExchange(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Errors reported by exchange feeds
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection to {exchange} failed: {reason}")]
    ConnectionFailed { exchange: String, reason: String },

    #[error("Feed disconnected")]
    Disconnected,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Timeout waiting for data")]
    Timeout,
}

/// Result type alias
pub type RegistryResult<T> = Result<T, RegistryError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type FeedResult<T> = Result<T, FeedError>;
