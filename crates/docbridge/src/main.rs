//! docbridge - relay MQTT messages into a document store.
//!
//! Runs until standard input reaches end-of-file (Ctrl-D), then closes the
//! store connection and exits.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use docbridge::broker::MqttConnector;
use docbridge::core::{IdStrategy, DEFAULT_USER};
use docbridge::store::SqliteConnector;
use docbridge::{Bridge, BridgeConfig, BridgeReport};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docbridge")]
#[command(version, about = "Relay MQTT messages into a document store")]
#[command(after_help = "Press Ctrl-D (end of input) to shut down.")]
struct Cli {
    /// Broker address, [user[:password]@]host[:port]
    #[arg(long, default_value = "localhost:1883")]
    mqtt_url: String,

    /// Document store endpoint
    #[arg(long, default_value = "./docbridge.db")]
    store_url: String,

    /// Store auth mode
    #[arg(long, default_value = "basic")]
    auth: String,

    /// Store user name
    #[arg(long, default_value = DEFAULT_USER)]
    user: String,

    /// Store password
    #[arg(long, env = "DOCBRIDGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Request an encrypted store connection
    #[arg(long)]
    use_ssl: bool,

    /// Target store, created if missing
    #[arg(long, default_value = "/demo/tables/sensor_data")]
    store_name: String,

    /// Topic to subscribe to
    #[arg(long, default_value = "mac/Processes")]
    mqtt_topic: String,

    /// Broker client identity
    #[arg(long, default_value = "sub")]
    client_id: String,

    /// Sleep between polls of an empty channel
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    idle_interval_ms: u64,

    /// Log and keep waiting after this long without a broker acknowledgement
    #[arg(long, default_value_t = 3000, value_name = "MS")]
    connect_timeout_ms: u64,

    /// Document identity scheme: timestamp, timestamp-seq or uuid
    #[arg(long, default_value = "timestamp-seq")]
    id_strategy: IdStrategy,

    /// JSON config file; replaces all flag values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<BridgeConfig> {
        if let Some(path) = &self.config {
            return BridgeConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()));
        }

        Ok(BridgeConfig {
            mqtt_url: self.mqtt_url,
            store_url: self.store_url,
            auth: self.auth,
            user: self.user,
            password: self.password.unwrap_or_default(),
            use_ssl: self.use_ssl,
            store_name: self.store_name,
            mqtt_topic: self.mqtt_topic,
            client_id: self.client_id,
            idle_interval_ms: self.idle_interval_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            id_strategy: self.id_strategy,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    // The stdin reader is a blocking read that cannot be cancelled.
    runtime.shutdown_background();

    match result {
        Ok(report) => {
            info!(
                received = report.received,
                stored = report.stored,
                uptime_secs = report.uptime.as_secs(),
                "docbridge exited"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("docbridge failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<BridgeReport> {
    let config = cli.into_config()?;
    info!(
        broker = %config.mqtt_url,
        topic = %config.mqtt_topic,
        store = %config.store_name,
        "starting docbridge"
    );

    let broker = MqttConnector::new(config.mqtt_config());
    let bridge = Bridge::new(SqliteConnector, broker, config);
    Ok(bridge.run(stdin_closed()).await?)
}

/// Resolves when standard input reaches end-of-file.
async fn stdin_closed() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "cannot read standard input; shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["docbridge", "--password", "pw"]).unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(
            config,
            BridgeConfig {
                password: "pw".into(),
                ..BridgeConfig::default()
            }
        );
    }

    #[test]
    fn test_cli_rejects_unknown_id_strategy() {
        assert!(Cli::try_parse_from(["docbridge", "--id-strategy", "random"]).is_err());
    }
}
