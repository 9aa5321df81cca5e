//! Store gateway traits: the abstract interface to a document store.
//!
//! A [`Connector`] opens a [`Connection`] from a validated descriptor; a
//! connection hands out [`DocumentStore`] handles by name. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use docbridge_core::{ConnectionDescriptor, Document, DocumentId};
use tracing::info;

use crate::error::Result;

/// Opens connections to a document store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Establish a session using a fully formed descriptor.
    ///
    /// Fails when the endpoint is unreachable or the credentials are rejected.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Connection>;
}

/// A live session to the document store.
///
/// Closed exactly once by its owner. Every operation after [`close`](Self::close)
/// fails with [`StoreError::Closed`](crate::StoreError::Closed), including
/// operations on store handles obtained earlier.
#[async_trait]
pub trait Connection: Send + Sync {
    type Store: DocumentStore + 'static;

    /// Whether a store with this name exists.
    async fn store_exists(&self, name: &str) -> Result<bool>;

    /// Create a new, empty store.
    async fn create_store(&self, name: &str) -> Result<Self::Store>;

    /// Open an existing store.
    async fn get_store(&self, name: &str) -> Result<Self::Store>;

    /// Release the session.
    async fn close(&self) -> Result<()>;

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// A named collection of documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The store's name.
    fn name(&self) -> &str;

    /// Durably write one document.
    ///
    /// Fails with `DuplicateId` if a document with the same identity exists.
    async fn insert(&self, document: &Document) -> Result<()>;

    /// Get a document by identity.
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Number of documents in the store.
    async fn count(&self) -> Result<usize>;

    /// All identities, in insertion order.
    async fn list_ids(&self) -> Result<Vec<DocumentId>>;
}

/// Extension trait for common connection patterns.
pub trait ConnectionExt: Connection {
    /// Open the named store, creating it first if it does not exist.
    ///
    /// The existence check and the creation are not atomic; a single writer
    /// process is assumed.
    fn open_or_create_store(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Self::Store>> + Send;
}

impl<C: Connection + ?Sized> ConnectionExt for C {
    async fn open_or_create_store(&self, name: &str) -> Result<Self::Store> {
        if self.store_exists(name).await? {
            info!(store = name, "opening store");
            self.get_store(name).await
        } else {
            info!(store = name, "creating store");
            self.create_store(name).await
        }
    }
}
