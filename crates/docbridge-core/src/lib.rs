//! # docbridge Core
//!
//! Pure primitives for docbridge: payloads, documents, document identities
//! and the connection descriptors for the broker and the document store.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Payload`] - Raw bytes of one broker message
//! - [`Document`] - A payload wrapped with its generated identity
//! - [`DocumentId`] - Pipeline-assigned document identity
//! - [`IdGenerator`] - Produces identities according to an [`IdStrategy`]
//! - [`ConnectionDescriptor`] - Validated store endpoint and credentials
//! - [`BrokerAddress`] - Parsed broker host, port and credentials
//!
//! ## Validation
//!
//! Descriptors are validated when they are built, so a missing password is
//! reported as a [`ConfigError`] before anything tries to connect.

pub mod descriptor;
pub mod document;
pub mod error;
pub mod id;
pub mod types;

pub use descriptor::{
    BrokerAddress, ConnectionDescriptor, DEFAULT_AUTH, DEFAULT_MQTT_PORT, DEFAULT_USER,
};
pub use document::Document;
pub use error::{ConfigError, Result};
pub use id::{IdGenerator, IdStrategy};
pub use types::{DocumentId, Payload};
