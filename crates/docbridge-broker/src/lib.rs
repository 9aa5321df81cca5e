//! # docbridge Broker
//!
//! Broker side of docbridge: sessions to an MQTT broker and the subscriber
//! stage that feeds the relay channel.
//!
//! ## Overview
//!
//! A [`BrokerConnector`] opens a [`BrokerSession`] to a
//! [`BrokerAddress`](docbridge_core::BrokerAddress). [`Subscriber`] then
//! subscribes that session to one topic and forwards every payload, in
//! arrival order, into a bounded channel. [`MqttConnector`] talks to a real
//! broker; [`MemoryBroker`] is for tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docbridge_broker::{BrokerConnector, MqttConnector, Subscriber};
//! use docbridge_core::BrokerAddress;
//! use tokio::sync::mpsc;
//!
//! async fn example() -> docbridge_broker::Result<()> {
//!     let address = BrokerAddress::parse("localhost:1883").unwrap();
//!     let session = MqttConnector::default().connect(&address, "sub").await?;
//!
//!     let (tx, mut rx) = mpsc::channel(1);
//!     let subscriber = Subscriber::subscribe(session, "mac/Processes", tx).await?;
//!     tokio::spawn(subscriber.run());
//!
//!     while let Some(payload) = rx.recv().await {
//!         println!("{} bytes", payload.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery
//!
//! Subscriptions are at-most-once. The channel between the subscriber and
//! the relay holds a single payload, so a slow relay stalls the subscriber
//! rather than buffering without bound.

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod session;

pub use error::{BrokerError, Result};
pub use memory::{topic_matches, MemoryBroker, MemorySession};
pub use mqtt::{MqttConfig, MqttConnector, MqttSession};
pub use session::{BrokerConnector, BrokerSession, Subscriber};
