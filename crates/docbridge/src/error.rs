//! Error types for the bridge.

use std::path::PathBuf;

use docbridge_broker::BrokerError;
use docbridge_core::{ConfigError, DocumentId};
use docbridge_store::StoreError;
use thiserror::Error;

/// Errors that stop the relay loop.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The store refused a document. No later payload is attempted.
    #[error("failed to store document {id}: {source}")]
    Insert {
        id: DocumentId,
        #[source]
        source: StoreError,
    },
}

/// Errors that end a bridge run.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid configuration, detected before connecting.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The configuration file could not be read or parsed.
    #[error("cannot load config file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    /// Store gateway error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Broker error.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Relay error.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The broker session ended without an error.
    #[error("subscriber stopped before shutdown was requested")]
    SubscriberStopped,

    /// A stage panicked or was cancelled unexpectedly.
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
