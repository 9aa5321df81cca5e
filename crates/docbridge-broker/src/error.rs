//! Error types for the broker module.

use thiserror::Error;

/// Errors that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached or the transport failed while connecting.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// The broker answered the connect with a refusal (bad credentials, protocol).
    #[error("broker refused connection: {0}")]
    ConnectionRefused(String),

    /// Client identity the protocol cannot carry.
    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),

    /// The broker rejected the subscription.
    #[error("subscription to {0:?} rejected")]
    SubscriptionRejected(String),

    /// The session was closed by the broker.
    #[error("session closed")]
    Closed,

    /// Client-side request queue failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
