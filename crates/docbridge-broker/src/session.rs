//! Broker session abstraction and the subscriber stage.
//!
//! A [`BrokerConnector`] opens a [`BrokerSession`]; the [`Subscriber`]
//! subscribes the session to one topic and forwards every payload into the
//! relay channel. Implementations may use MQTT or the in-memory broker.

use async_trait::async_trait;
use docbridge_core::{BrokerAddress, Payload};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;

/// Opens sessions to a broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    type Session: BrokerSession + 'static;

    /// Connect and authenticate with the address's credentials.
    ///
    /// Returns once the broker has acknowledged the connection. Refusals are
    /// returned immediately; a slow broker is waited for.
    async fn connect(&self, address: &BrokerAddress, client_id: &str) -> Result<Self::Session>;
}

/// A live session to the broker.
///
/// Implementations must be Send so the session can move into its own task.
#[async_trait]
pub trait BrokerSession: Send {
    /// Subscribe to a topic with at-most-once delivery.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Wait for the next payload on a subscribed topic.
    ///
    /// Returns `None` once the session has ended and nothing more will arrive.
    async fn next_payload(&mut self) -> Result<Option<Payload>>;

    /// The identity this session was opened with.
    fn client_id(&self) -> &str;
}

/// The producer stage: forwards payloads from a subscribed session into the
/// relay channel.
///
/// `send` on the channel suspends while the single slot is full, so the
/// session is not polled until the relay catches up.
pub struct Subscriber<S: BrokerSession> {
    session: S,
    topic: String,
    sender: mpsc::Sender<Payload>,
}

impl<S: BrokerSession> Subscriber<S> {
    /// Subscribe `session` to `topic` and bind it to the relay channel.
    pub async fn subscribe(mut session: S, topic: &str, sender: mpsc::Sender<Payload>) -> Result<Self> {
        session.subscribe(topic).await?;
        info!(topic, client_id = session.client_id(), "subscription requested");

        Ok(Self {
            session,
            topic: topic.to_string(),
            sender,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Forward payloads until the session ends or the relay goes away.
    ///
    /// Returns the number of payloads handed to the channel.
    pub async fn run(mut self) -> Result<u64> {
        let mut forwarded = 0u64;

        loop {
            let Some(payload) = self.session.next_payload().await? else {
                info!(topic = %self.topic, forwarded, "broker session ended");
                return Ok(forwarded);
            };

            if self.sender.send(payload).await.is_err() {
                info!(topic = %self.topic, forwarded, "relay channel closed; subscriber stopping");
                return Ok(forwarded);
            }

            forwarded += 1;
            debug!(topic = %self.topic, forwarded, "read message from broker");
        }
    }
}
