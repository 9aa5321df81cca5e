//! # docbridge Testkit
//!
//! Testing utilities for docbridge.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: descriptors for the in-memory backends, a polling
//!   `wait_until`, and [`FaultyConnector`], which counts insert attempts and
//!   can reject a chosen one
//! - **Generators**: Proptest strategies for payload sequences, topics and
//!   identity strategies
//!
//! ## Fault Injection
//!
//! ```rust
//! use std::sync::Arc;
//! use docbridge_store::MemoryServer;
//! use docbridge_testkit::FaultyConnector;
//!
//! let server = MemoryServer::new();
//! // The third insert through any store of this connector fails.
//! let connector = FaultyConnector::new(Arc::clone(&server)).fail_on(3);
//! assert_eq!(connector.attempts(), 0);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use docbridge_testkit::generators::payload_sequence;
//!
//! proptest! {
//!     #[test]
//!     fn relay_keeps_order(payloads in payload_sequence(16, 64)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    descriptor, memory_broker_address, memory_descriptor, subscribed, wait_until, AttemptCounter,
    FaultyConnection, FaultyConnector, FaultyStore, TEST_PASSWORD,
};
pub use generators::{id_strategy, payload, payload_sequence, topic_name, unique_id_strategy};
