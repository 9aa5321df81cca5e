//! A simple in-memory broker for testing.
//!
//! Uses channels to simulate message delivery to subscribed sessions.
//! Topic filters support the MQTT `+` and `#` wildcards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docbridge_core::{BrokerAddress, Payload};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BrokerError, Result};
use crate::session::{BrokerConnector, BrokerSession};

/// Shared state for the in-memory broker.
pub struct MemoryBroker {
    /// Connected clients by client id.
    clients: Mutex<HashMap<String, Client>>,
    /// Credentials every session must present, if any.
    credentials: Option<(String, String)>,
    connects: AtomicUsize,
}

/// Broker-side view of a connected session.
struct Client {
    filters: Vec<String>,
    sender: mpsc::UnboundedSender<Payload>,
    pending: Arc<AtomicUsize>,
}

impl MemoryBroker {
    /// Create a broker that accepts anonymous sessions.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a broker that requires the given credentials.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            credentials: Some((username.into(), password.into())),
            ..Self::default()
        })
    }

    /// Deliver a payload to every session subscribed to a matching filter.
    ///
    /// Returns the number of sessions it was delivered to.
    pub fn publish(&self, topic: &str, payload: Payload) -> usize {
        let clients = self.lock_clients();
        let mut delivered = 0;

        for (client_id, client) in clients.iter() {
            if !client.filters.iter().any(|f| topic_matches(f, topic)) {
                continue;
            }
            // A closed receiver means the session is gone; skip it.
            if client.sender.send(payload.clone()).is_ok() {
                client.pending.fetch_add(1, Ordering::SeqCst);
                delivered += 1;
                debug!(client_id, topic, "memory broker delivered message");
            }
        }

        delivered
    }

    /// Drop every session. Their `next_payload` returns `None` once drained.
    pub fn disconnect_all(&self) {
        self.lock_clients().clear();
    }

    /// Number of accepted connections.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sessions with a filter matching `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock_clients()
            .values()
            .filter(|c| c.filters.iter().any(|f| topic_matches(f, topic)))
            .count()
    }

    /// Payloads delivered to a session but not yet taken by it.
    pub fn pending(&self, client_id: &str) -> usize {
        self.lock_clients()
            .get(client_id)
            .map(|c| c.pending.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashMap<String, Client>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            credentials: None,
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BrokerConnector for Arc<MemoryBroker> {
    type Session = MemorySession;

    async fn connect(&self, address: &BrokerAddress, client_id: &str) -> Result<MemorySession> {
        if client_id.is_empty() {
            return Err(BrokerError::InvalidClientId(client_id.to_string()));
        }
        if let Some((username, password)) = &self.credentials {
            let presented = (address.username(), address.password());
            if presented != (Some(username.as_str()), Some(password.as_str())) {
                return Err(BrokerError::ConnectionRefused("bad user name or password".into()));
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        // A new session with the same id takes over, as in MQTT.
        self.lock_clients().insert(
            client_id.to_string(),
            Client {
                filters: Vec::new(),
                sender,
                pending: Arc::clone(&pending),
            },
        );
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MemorySession {
            broker: Arc::clone(self),
            client_id: client_id.to_string(),
            receiver,
            pending,
        })
    }
}

/// In-memory session implementation.
pub struct MemorySession {
    broker: Arc<MemoryBroker>,
    client_id: String,
    receiver: mpsc::UnboundedReceiver<Payload>,
    pending: Arc<AtomicUsize>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if topic.is_empty() {
            return Err(BrokerError::SubscriptionRejected(topic.to_string()));
        }
        let mut clients = self.broker.lock_clients();
        let client = clients
            .get_mut(&self.client_id)
            .ok_or(BrokerError::Closed)?;
        client.filters.push(topic.to_string());
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<Option<Payload>> {
        let payload = self.receiver.recv().await;
        if payload.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(payload)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Whether an MQTT topic filter matches a topic name.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
