//! The relay loop: the consumer stage between the channel and the store.
//!
//! ## States
//!
//! ```text
//!            payload
//!   POLLING ---------> STORING
//!      ^  |               |
//!      |  | empty:        | inserted
//!      |  | sleep idle    |
//!      +--+  <------------+
//! ```
//!
//! POLLING never blocks on the channel. An empty channel is a debug
//! heartbeat followed by one idle interval of sleep; a disconnected and
//! drained channel ends the loop. STORING wraps the payload with a fresh
//! identity and inserts it. A failed insert ends the loop with an error and
//! nothing after that payload is attempted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docbridge_core::{Document, IdGenerator, Payload};
use docbridge_store::DocumentStore;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info};

use crate::error::RelayError;

/// Counters shared between the relay and whoever watches it.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    stored: AtomicU64,
    idle_polls: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Payloads taken off the channel.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Documents successfully inserted.
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::SeqCst)
    }

    /// Polls that found the channel empty.
    pub fn idle_polls(&self) -> u64 {
        self.idle_polls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            received: self.received(),
            stored: self.stored(),
            idle_polls: self.idle_polls(),
        }
    }
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub received: u64,
    pub stored: u64,
    pub idle_polls: u64,
}

/// Consumer stage. Owns the receiving end of the relay channel.
pub struct RelayLoop<D: DocumentStore> {
    store: Arc<D>,
    receiver: mpsc::Receiver<Payload>,
    ids: IdGenerator,
    idle_interval: Duration,
    stats: Arc<RelayStats>,
}

impl<D: DocumentStore> RelayLoop<D> {
    pub fn new(
        store: Arc<D>,
        receiver: mpsc::Receiver<Payload>,
        ids: IdGenerator,
        idle_interval: Duration,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            store,
            receiver,
            ids,
            idle_interval,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the channel is closed and drained, or an insert fails.
    pub async fn run(mut self) -> Result<RelaySnapshot, RelayError> {
        info!(
            store = self.store.name(),
            strategy = %self.ids.strategy(),
            idle_ms = self.idle_interval.as_millis() as u64,
            "relay started"
        );

        loop {
            match self.receiver.try_recv() {
                Ok(payload) => self.store_payload(payload).await?,
                Err(TryRecvError::Empty) => {
                    self.stats.idle_polls.fetch_add(1, Ordering::SeqCst);
                    debug!("waiting for messages on channel");
                    tokio::time::sleep(self.idle_interval).await;
                }
                Err(TryRecvError::Disconnected) => {
                    let snapshot = self.stats.snapshot();
                    info!(
                        received = snapshot.received,
                        stored = snapshot.stored,
                        "relay channel closed; relay stopping"
                    );
                    return Ok(snapshot);
                }
            }
        }
    }

    async fn store_payload(&mut self, payload: Payload) -> Result<(), RelayError> {
        self.stats.received.fetch_add(1, Ordering::SeqCst);
        let document = Document::new(self.ids.next_id(), payload);

        if let Err(source) = self.store.insert(&document).await {
            error!(id = %document.id(), error = %source, "failed to store document");
            return Err(RelayError::Insert {
                id: document.id().clone(),
                source,
            });
        }

        self.stats.stored.fetch_add(1, Ordering::SeqCst);
        debug!(id = %document.id(), bytes = document.len(), "stored document");
        Ok(())
    }
}
