//! Bridge configuration.
//!
//! Every field has a default; a JSON file with the same (snake_case) field
//! names can replace the whole set. Connection descriptors are built and
//! validated from here, so bad settings surface before anything connects.

use std::path::Path;
use std::time::Duration;

use docbridge_broker::MqttConfig;
use docbridge_core::{
    BrokerAddress, ConfigError, ConnectionDescriptor, IdStrategy, DEFAULT_AUTH, DEFAULT_USER,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Configuration for one bridge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Broker address, `[user[:password]@]host[:port]`.
    pub mqtt_url: String,
    /// Store endpoint. For SQLite, a file path or `:memory:`.
    pub store_url: String,
    pub auth: String,
    pub user: String,
    /// Store password. Must not be empty.
    pub password: String,
    pub use_ssl: bool,
    /// Target store, created on first use.
    pub store_name: String,
    pub mqtt_topic: String,
    pub client_id: String,
    /// Sleep between polls of an empty channel.
    pub idle_interval_ms: u64,
    /// Window after which a pending broker connect is logged and re-awaited.
    pub connect_timeout_ms: u64,
    pub id_strategy: IdStrategy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt_url: "localhost:1883".into(),
            store_url: "./docbridge.db".into(),
            auth: DEFAULT_AUTH.into(),
            user: DEFAULT_USER.into(),
            password: String::new(),
            use_ssl: false,
            store_name: "/demo/tables/sensor_data".into(),
            mqtt_topic: "mac/Processes".into(),
            client_id: "sub".into(),
            idle_interval_ms: 1000,
            connect_timeout_ms: 3000,
            id_strategy: IdStrategy::default(),
        }
    }
}

impl BridgeConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file_error = |reason: String| BridgeError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| file_error(e.to_string()))
    }

    /// Check the settings that no descriptor covers.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.idle_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("idle_interval_ms"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("connect_timeout_ms"));
        }
        Ok(())
    }

    /// Build the store connection descriptor.
    ///
    /// Fails with [`ConfigError::MissingPassword`] when no password is set.
    pub fn descriptor(&self) -> std::result::Result<ConnectionDescriptor, ConfigError> {
        ConnectionDescriptor::new(
            &self.store_url,
            &self.auth,
            &self.user,
            &self.password,
            self.use_ssl,
        )
    }

    pub fn broker_address(&self) -> std::result::Result<BrokerAddress, ConfigError> {
        BrokerAddress::parse(&self.mqtt_url)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn connect_window(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// MQTT session settings derived from this configuration.
    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            connect_window: self.connect_window(),
            ..MqttConfig::default()
        }
    }
}
