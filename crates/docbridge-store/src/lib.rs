//! # docbridge Store
//!
//! Store gateway for docbridge. Provides a trait-based interface to a
//! document store with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! A [`Connector`] turns a validated
//! [`ConnectionDescriptor`](docbridge_core::ConnectionDescriptor) into a
//! [`Connection`]; the connection opens or creates named [`DocumentStore`]s.
//! The primary implementation is [`SqliteConnector`], with [`MemoryServer`]
//! for testing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docbridge_core::{ConnectionDescriptor, Document, DocumentId, Payload};
//! use docbridge_store::{Connection, ConnectionExt, Connector, DocumentStore, SqliteConnector};
//!
//! async fn example() -> docbridge_store::Result<()> {
//!     let descriptor =
//!         ConnectionDescriptor::new("bridge.db", "basic", "bridge", "secret", false).unwrap();
//!     let conn = SqliteConnector.connect(&descriptor).await?;
//!
//!     let store = conn.open_or_create_store("/demo/tables/sensor_data").await?;
//!     store
//!         .insert(&Document::new(DocumentId::from("1"), Payload::from_static(b"{}")))
//!         .await?;
//!
//!     conn.close().await
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Create or open**: [`ConnectionExt::open_or_create_store`] checks then
//!   acts; it is not atomic against other writers.
//! - **Unique identities**: inserting a second document with an existing
//!   identity fails with [`StoreError::DuplicateId`].
//! - **Close once**: operations after close fail with [`StoreError::Closed`].

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryConnection, MemoryServer, MemoryStore};
pub use sqlite::{SqliteConnection, SqliteConnector, SqliteStore};
pub use traits::{Connection, ConnectionExt, Connector, DocumentStore};

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
