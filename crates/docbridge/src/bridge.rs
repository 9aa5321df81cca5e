//! The lifecycle coordinator.
//!
//! Startup order: connect to the store once, open or create the target
//! store, connect to the broker, subscribe. Then the subscriber and the
//! relay run as two tasks joined by a single-slot channel while the
//! coordinator waits for the shutdown signal.
//!
//! Whatever ends the run (the signal, a failed stage, a failed startup step)
//! the store connection is closed exactly once before [`Bridge::run`]
//! returns. Stages are aborted, not drained: a payload still in the channel
//! at shutdown is lost.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docbridge_broker::{BrokerConnector, Subscriber};
use docbridge_core::{BrokerAddress, IdGenerator, Payload};
use docbridge_store::{Connection, ConnectionExt, Connector};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, RelayError, Result};
use crate::relay::{RelayLoop, RelaySnapshot, RelayStats};

/// Payloads that may wait between the subscriber and the relay.
pub const CHANNEL_CAPACITY: usize = 1;

/// Summary of a run that ended on the shutdown signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    /// Payloads the relay took off the channel.
    pub received: u64,
    /// Documents inserted.
    pub stored: u64,
    pub idle_polls: u64,
    /// Time from store connect to shutdown.
    pub uptime: Duration,
}

/// Wires a store connector and a broker connector into a running pipeline.
pub struct Bridge<C, B> {
    store_connector: C,
    broker_connector: B,
    config: BridgeConfig,
    stats: Arc<RelayStats>,
}

impl<C, B> Bridge<C, B>
where
    C: Connector,
    B: BrokerConnector,
{
    pub fn new(store_connector: C, broker_connector: B, config: BridgeConfig) -> Self {
        Self {
            store_connector,
            broker_connector,
            config,
            stats: RelayStats::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Relay counters, live while the bridge runs.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Run the pipeline until `shutdown` resolves or a stage fails.
    ///
    /// Configuration is validated before any connection is attempted.
    pub async fn run<F>(self, shutdown: F) -> Result<BridgeReport>
    where
        F: Future<Output = ()> + Send,
    {
        self.config.validate()?;
        let descriptor = self.config.descriptor()?;
        let address = self.config.broker_address()?;

        info!(descriptor = %descriptor, "connecting to document store");
        let connection = self.store_connector.connect(&descriptor).await?;
        let started = Instant::now();
        info!("connected to document store");

        let result = self.run_connected(&connection, &address, shutdown).await;

        match connection.close().await {
            Ok(()) => info!("store connection closed"),
            Err(e) => warn!(error = %e, "failed to close store connection"),
        }

        let snapshot = self.stats.snapshot();
        match &result {
            Ok(()) => info!(
                received = snapshot.received,
                stored = snapshot.stored,
                "bridge shut down"
            ),
            Err(e) => warn!(
                error = %e,
                received = snapshot.received,
                stored = snapshot.stored,
                "bridge stopped"
            ),
        }

        result.map(|()| report(snapshot, started.elapsed()))
    }

    async fn run_connected<K, F>(
        &self,
        connection: &K,
        address: &BrokerAddress,
        shutdown: F,
    ) -> Result<()>
    where
        K: Connection,
        F: Future<Output = ()> + Send,
    {
        let store = Arc::new(connection.open_or_create_store(&self.config.store_name).await?);

        let session = self
            .broker_connector
            .connect(address, &self.config.client_id)
            .await?;
        let (sender, receiver) = mpsc::channel::<Payload>(CHANNEL_CAPACITY);
        let subscriber = Subscriber::subscribe(session, &self.config.mqtt_topic, sender).await?;

        let relay = RelayLoop::new(
            store,
            receiver,
            IdGenerator::new(self.config.id_strategy),
            self.config.idle_interval(),
            Arc::clone(&self.stats),
        );

        let mut subscriber_task = tokio::spawn(subscriber.run());
        let mut relay_task = tokio::spawn(relay.run());
        tokio::pin!(shutdown);

        let ended = tokio::select! {
            _ = &mut shutdown => Ended::Shutdown,
            joined = &mut subscriber_task => Ended::Subscriber(joined),
            joined = &mut relay_task => Ended::Relay(joined),
        };

        let outcome = match ended {
            Ended::Shutdown => {
                info!("shutdown requested");
                Ok(())
            }
            // The subscriber also stops cleanly when a failed relay drops the
            // receiver. The relay returns once the channel is drained, and its
            // error takes precedence.
            Ended::Subscriber(joined) => match subscriber_ended(joined) {
                Err(BridgeError::SubscriberStopped) => match relay_ended((&mut relay_task).await) {
                    Ok(()) => Err(BridgeError::SubscriberStopped),
                    Err(e) => Err(e),
                },
                other => other,
            },
            // A clean relay end means the subscriber dropped its sender, so
            // its task is done and its result says why.
            Ended::Relay(joined) => match relay_ended(joined) {
                Ok(()) => subscriber_ended((&mut subscriber_task).await),
                Err(e) => Err(e),
            },
        };

        stop(subscriber_task).await;
        stop(relay_task).await;
        outcome
    }
}

type Joined<T> = std::result::Result<T, JoinError>;

enum Ended {
    Shutdown,
    Subscriber(Joined<docbridge_broker::Result<u64>>),
    Relay(Joined<std::result::Result<RelaySnapshot, RelayError>>),
}

fn subscriber_ended(joined: Joined<docbridge_broker::Result<u64>>) -> Result<()> {
    match joined {
        Ok(Ok(forwarded)) => {
            info!(forwarded, "subscriber finished");
            Err(BridgeError::SubscriberStopped)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(BridgeError::TaskFailed(e.to_string())),
    }
}

fn relay_ended(joined: Joined<std::result::Result<RelaySnapshot, RelayError>>) -> Result<()> {
    match joined {
        Ok(Ok(snapshot)) => {
            info!(stored = snapshot.stored, "relay finished");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(BridgeError::TaskFailed(e.to_string())),
    }
}

/// Abort a stage and wait for it to unwind. A finished stage is left as is.
async fn stop<T>(handle: JoinHandle<T>) {
    if !handle.is_finished() {
        handle.abort();
        let _ = handle.await;
    }
}

fn report(snapshot: RelaySnapshot, uptime: Duration) -> BridgeReport {
    BridgeReport {
        received: snapshot.received,
        stored: snapshot.stored,
        idle_polls: snapshot.idle_polls,
        uptime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_broker::MemoryBroker;
    use docbridge_core::ConfigError;
    use docbridge_store::MemoryServer;
    use tokio::sync::oneshot;

    fn config() -> BridgeConfig {
        BridgeConfig {
            password: "secret".into(),
            idle_interval_ms: 5,
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_shutdown_without_messages_closes_once() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::new();
        let bridge = Bridge::new(Arc::clone(&server), Arc::clone(&broker), config());

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(bridge.run(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stored, 0);
        assert_eq!(server.connect_count(), 1);
        assert_eq!(server.close_count(), 1);
        assert_eq!(server.create_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_password_never_connects() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::new();
        let config = BridgeConfig {
            password: String::new(),
            ..config()
        };

        let err = Bridge::new(Arc::clone(&server), Arc::clone(&broker), config)
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(server.connect_count(), 0);
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_idle_interval_never_connects() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::new();
        let config = BridgeConfig {
            idle_interval_ms: 0,
            ..config()
        };

        let err = Bridge::new(Arc::clone(&server), Arc::clone(&broker), config)
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Config(ConfigError::ZeroInterval(_))));
        assert_eq!(server.connect_count(), 0);
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_broker_refusal_still_closes_store() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::with_credentials("mqtt", "pw");

        let err = Bridge::new(Arc::clone(&server), broker, config())
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Broker(_)));
        assert_eq!(server.close_count(), 1);
    }
}
