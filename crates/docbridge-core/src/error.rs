//! Error types for docbridge core.

use thiserror::Error;

/// Configuration errors, detected before any connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("password for the store connection needs to be set")]
    MissingPassword,

    #[error("store endpoint is empty")]
    MissingEndpoint,

    #[error("unsupported auth mode: {0}")]
    UnsupportedAuth(String),

    #[error("invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid broker address {address:?}: {reason}")]
    InvalidBrokerAddress { address: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("unknown id strategy: {0}")]
    UnknownIdStrategy(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
