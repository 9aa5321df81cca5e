//! Error types for the store gateway.

use docbridge_core::DocumentId;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The endpoint could not be opened.
    #[error("store endpoint {endpoint} is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// Credentials were rejected.
    #[error("authentication failed for user {0:?}")]
    AuthenticationFailed(String),

    /// The named store does not exist.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// The named store already exists.
    #[error("store already exists: {0}")]
    StoreExists(String),

    /// A document with this identity is already stored.
    #[error("document {id} already exists in store {store}")]
    DuplicateId { store: String, id: DocumentId },

    /// The store refused the write.
    #[error("insert of document {id} rejected: {reason}")]
    InsertRejected { id: DocumentId, reason: String },

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Lock poisoning or a failed blocking task.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
