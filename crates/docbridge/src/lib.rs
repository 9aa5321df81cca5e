//! # docbridge
//!
//! Relays messages from an MQTT topic into a document store.
//!
//! ## Overview
//!
//! Two stages run concurrently:
//!
//! - **Subscriber**: reads payloads from one broker topic and pushes them
//!   into a single-slot channel.
//! - **Relay**: polls the channel, wraps each payload with a fresh identity
//!   and inserts it into the target store, in channel order.
//!
//! The [`Bridge`] coordinator connects both ends, runs the stages until a
//! shutdown future resolves or a stage fails, and closes the store
//! connection exactly once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docbridge::{Bridge, BridgeConfig};
//! use docbridge::broker::MqttConnector;
//! use docbridge::store::SqliteConnector;
//!
//! async fn example() -> docbridge::Result<()> {
//!     let config = BridgeConfig {
//!         password: "secret".into(),
//!         ..BridgeConfig::default()
//!     };
//!     let broker = MqttConnector::new(config.mqtt_config());
//!     let bridge = Bridge::new(SqliteConnector, broker, config);
//!
//!     // Any future works as the shutdown signal.
//!     let (_stop, stopped) = tokio::sync::oneshot::channel::<()>();
//!     let report = bridge.run(async { let _ = stopped.await; }).await?;
//!     println!("stored {} documents", report.stored);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `docbridge::core` - Payloads, documents, identities, descriptors
//! - `docbridge::store` - Store gateway with SQLite and in-memory backends
//! - `docbridge::broker` - Broker sessions and the subscriber stage

pub mod bridge;
pub mod config;
pub mod error;
pub mod relay;

// Re-export component crates
pub use docbridge_broker as broker;
pub use docbridge_core as core;
pub use docbridge_store as store;

// Re-export main types for convenience
pub use bridge::{Bridge, BridgeReport, CHANNEL_CAPACITY};
pub use config::BridgeConfig;
pub use error::{BridgeError, RelayError, Result};
pub use relay::{RelayLoop, RelaySnapshot, RelayStats};
