//! MQTT sessions over `rumqttc`.
//!
//! The connect handshake is awaited in fixed windows: when a window elapses
//! without an acknowledgement the same attempt keeps being awaited, while a
//! refusal or a transport error ends it immediately. After the subscription
//! is in place, connection losses are logged and the event loop reconnects;
//! the subscription is renewed on every reconnect.

use std::time::Duration;

use async_trait::async_trait;
use docbridge_core::{BrokerAddress, Payload};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use tracing::{debug, info, warn};

use crate::error::{BrokerError, Result};
use crate::session::{BrokerConnector, BrokerSession};

/// Configuration for MQTT sessions.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// How long to wait for the connect acknowledgement before logging and
    /// waiting again. Must not be zero.
    pub connect_window: Duration,
    /// MQTT keep-alive interval. Zero or at least one second.
    pub keep_alive: Duration,
    /// Pause between reconnect attempts after the connection drops.
    pub reconnect_delay: Duration,
    /// Capacity of the client's outgoing request queue.
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            connect_window: Duration::from_secs(3),
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            request_capacity: 10,
        }
    }
}

/// Opens [`MqttSession`]s.
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    config: MqttConfig,
}

impl MqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self, address: &BrokerAddress, client_id: &str) -> Result<MqttOptions> {
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(BrokerError::InvalidClientId(client_id.to_string()));
        }
        if self.config.connect_window.is_zero() {
            return Err(BrokerError::Connection(
                "connect window must be greater than zero".to_string(),
            ));
        }
        let keep_alive = self.config.keep_alive;
        if !keep_alive.is_zero() && keep_alive < Duration::from_secs(1) {
            return Err(BrokerError::Connection(format!(
                "keep alive must be zero or at least one second, got {keep_alive:?}"
            )));
        }

        let mut options = MqttOptions::new(client_id, address.host(), address.port());
        options.set_keep_alive(keep_alive);
        if let Some(username) = address.username() {
            options.set_credentials(username, address.password().unwrap_or_default());
        }
        Ok(options)
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    type Session = MqttSession;

    async fn connect(&self, address: &BrokerAddress, client_id: &str) -> Result<MqttSession> {
        let options = self.options(address, client_id)?;
        let (client, mut eventloop) = AsyncClient::new(options, self.config.request_capacity);

        info!(broker = %address, client_id, "connecting to broker");
        await_connack(&mut eventloop, self.config.connect_window).await?;
        info!(broker = %address, client_id, "connected to broker");

        Ok(MqttSession {
            client,
            eventloop,
            client_id: client_id.to_string(),
            topic: None,
            reconnect_delay: self.config.reconnect_delay,
        })
    }
}

/// Drive the event loop until the broker acknowledges the connection.
async fn await_connack(eventloop: &mut EventLoop, window: Duration) -> Result<()> {
    loop {
        let poll = eventloop.poll();
        tokio::pin!(poll);

        let mut waited = Duration::ZERO;
        let event = loop {
            tokio::select! {
                event = &mut poll => break event,
                _ = tokio::time::sleep(window) => {
                    waited += window;
                    info!(waited_ms = waited.as_millis() as u64, "still connecting to broker");
                }
            }
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BrokerError::ConnectionRefused(format!("{code:?}"))),
                };
            }
            Ok(other) => debug!(?other, "event before connect acknowledgement"),
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(BrokerError::ConnectionRefused(format!("{code:?}")));
            }
            Err(e) => return Err(BrokerError::Connection(e.to_string())),
        }
    }
}

/// An MQTT session. Owns the client and its event loop.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    client_id: String,
    topic: Option<String>,
    reconnect_delay: Duration,
}

// Takes the client alone: the event loop is not Sync.
async fn request_subscription(client: &AsyncClient, topic: &str) -> Result<()> {
    client
        .subscribe(topic, QoS::AtMostOnce)
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        request_subscription(&self.client, topic).await?;
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<Option<Payload>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "received publish");
                    return Ok(Some(publish.payload));
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let topic = self.topic.clone().unwrap_or_default();
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(BrokerError::SubscriptionRejected(topic));
                    }
                    info!(topic, "subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Clean sessions drop subscriptions on reconnect.
                    if let Some(topic) = self.topic.clone() {
                        info!(topic, "reconnected to broker; renewing subscription");
                        request_subscription(&self.client, &topic).await?;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("broker sent disconnect");
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Err(BrokerError::ConnectionRefused(format!("{code:?}")));
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = self.reconnect_delay.as_millis() as u64,
                        "broker connection lost; reconnecting"
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_options_reject_empty_client_id() {
        let connector = MqttConnector::default();
        let err = connector.options(&BrokerAddress::new("localhost", 1883), "").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidClientId(_)));
    }

    #[test]
    fn test_options_reject_sub_second_keep_alive() {
        let connector = MqttConnector::new(MqttConfig {
            keep_alive: Duration::from_millis(500),
            ..MqttConfig::default()
        });
        assert!(connector.options(&BrokerAddress::new("localhost", 1883), "sub").is_err());
    }

    #[test]
    fn test_options_reject_zero_connect_window() {
        let connector = MqttConnector::new(MqttConfig {
            connect_window: Duration::ZERO,
            ..MqttConfig::default()
        });
        let err = connector.options(&BrokerAddress::new("localhost", 1883), "sub").unwrap_err();
        assert!(matches!(err, BrokerError::Connection(_)));
    }

    #[test]
    fn test_options_carry_credentials() {
        let connector = MqttConnector::default();
        let address = BrokerAddress::parse("user:pw@broker.local:1884").unwrap();
        let options = connector.options(&address, "sub").unwrap();

        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.client_id(), "sub");
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "pw".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_refused_port_is_fatal() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = MqttConnector::default();
        let err = connector
            .connect(&BrokerAddress::new("127.0.0.1", port), "sub")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::Connection(_)));
    }

    #[tokio::test]
    async fn test_slow_connack_is_awaited_on_one_connection() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Instant;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        const CONNACK_DELAY: Duration = Duration::from_millis(300);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let server = tokio::spawn({
            let accepted = Arc::clone(&accepted);
            async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 256];
                        let _ = socket.read(&mut buf).await;
                        // Several connect windows pass before the broker answers.
                        tokio::time::sleep(CONNACK_DELAY).await;
                        let _ = socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await;
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                    });
                }
            }
        });

        let connector = MqttConnector::new(MqttConfig {
            connect_window: Duration::from_millis(50),
            ..MqttConfig::default()
        });
        let started = Instant::now();
        let session = connector
            .connect(&BrokerAddress::new("127.0.0.1", port), "sub")
            .await
            .unwrap();

        assert!(started.elapsed() >= CONNACK_DELAY);
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(session.client_id(), "sub");

        server.abort();
    }

    #[tokio::test]
    async fn test_connack_refusal_is_fatal() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            // CONNACK, return code 4: bad user name or password.
            socket.write_all(&[0x20, 0x02, 0x00, 0x04]).await.unwrap();
            socket.flush().await.unwrap();
            // Keep the socket open until the client has read the reply.
            let _ = socket.read(&mut buf).await;
        });

        let connector = MqttConnector::default();
        let address = BrokerAddress::new("127.0.0.1", port).with_credentials("u", "wrong");
        let err = connector.connect(&address, "sub").await.err().unwrap();
        assert!(matches!(err, BrokerError::ConnectionRefused(_)));

        server.abort();
    }
}
