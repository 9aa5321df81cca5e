//! Test fixtures and helpers.
//!
//! [`FaultyConnector`] wraps any store connector and counts insert attempts
//! across every store it hands out. Configured with
//! [`fail_on`](FaultyConnector::fail_on), it rejects exactly that attempt
//! without passing it to the wrapped store.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docbridge_broker::MemoryBroker;
use docbridge_core::{BrokerAddress, ConnectionDescriptor, Document, DocumentId};
use docbridge_store::{Connection, Connector, DocumentStore, Result, StoreError};

/// Password accepted by [`memory_descriptor`].
pub const TEST_PASSWORD: &str = "test-password";

/// A valid descriptor for the in-memory server.
pub fn memory_descriptor() -> ConnectionDescriptor {
    descriptor("memory")
}

/// A valid descriptor for `endpoint` with the test credentials.
pub fn descriptor(endpoint: &str) -> ConnectionDescriptor {
    match ConnectionDescriptor::new(endpoint, "basic", "tester", TEST_PASSWORD, false) {
        Ok(descriptor) => descriptor,
        Err(e) => panic!("test descriptor for {endpoint:?} is invalid: {e}"),
    }
}

/// Address for the in-memory broker. Its host and port are not used.
pub fn memory_broker_address() -> BrokerAddress {
    BrokerAddress::new("memory", 1883)
}

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Wait until some session on `broker` is subscribed to a filter matching `topic`.
pub fn subscribed<'a>(broker: &'a MemoryBroker, topic: &'a str) -> impl Future<Output = bool> + 'a {
    wait_until(Duration::from_secs(5), move || broker.subscriber_count(topic) > 0)
}

/// Connector wrapper that counts and optionally rejects inserts.
pub struct FaultyConnector<C> {
    inner: C,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    fail_on: Option<usize>,
    attempts: AtomicUsize,
}

impl<C: Connector> FaultyConnector<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Reject the `n`th insert attempt (1-based).
    pub fn fail_on(self, n: usize) -> Self {
        Self {
            inner: self.inner,
            faults: Arc::new(Faults {
                fail_on: Some(n),
                attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Insert attempts so far, including the rejected one.
    pub fn attempts(&self) -> usize {
        self.faults.attempts.load(Ordering::SeqCst)
    }

    /// A handle that reads the attempt counter after the connector moved.
    pub fn attempt_counter(&self) -> AttemptCounter {
        AttemptCounter(Arc::clone(&self.faults))
    }
}

/// Reads a [`FaultyConnector`]'s attempt count.
#[derive(Clone)]
pub struct AttemptCounter(Arc<Faults>);

impl AttemptCounter {
    pub fn get(&self) -> usize {
        self.0.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Connector> Connector for FaultyConnector<C> {
    type Connection = FaultyConnection<C::Connection>;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Connection> {
        Ok(FaultyConnection {
            inner: self.inner.connect(descriptor).await?,
            faults: Arc::clone(&self.faults),
        })
    }
}

/// Connection produced by [`FaultyConnector`].
pub struct FaultyConnection<K> {
    inner: K,
    faults: Arc<Faults>,
}

impl<K: Connection> FaultyConnection<K> {
    fn wrap(&self, store: K::Store) -> FaultyStore<K::Store> {
        FaultyStore {
            inner: store,
            faults: Arc::clone(&self.faults),
        }
    }
}

#[async_trait]
impl<K: Connection> Connection for FaultyConnection<K> {
    type Store = FaultyStore<K::Store>;

    async fn store_exists(&self, name: &str) -> Result<bool> {
        self.inner.store_exists(name).await
    }

    async fn create_store(&self, name: &str) -> Result<Self::Store> {
        Ok(self.wrap(self.inner.create_store(name).await?))
    }

    async fn get_store(&self, name: &str) -> Result<Self::Store> {
        Ok(self.wrap(self.inner.get_store(name).await?))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Store handle produced by [`FaultyConnection`].
pub struct FaultyStore<S> {
    inner: S,
    faults: Arc<Faults>,
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert(&self, document: &Document) -> Result<()> {
        let attempt = self.faults.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.faults.fail_on == Some(attempt) {
            return Err(StoreError::InsertRejected {
                id: document.id().clone(),
                reason: format!("injected failure on insert #{attempt}"),
            });
        }
        self.inner.insert(document).await
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.inner.get(id).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn list_ids(&self) -> Result<Vec<DocumentId>> {
        self.inner.list_ids().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::Payload;
    use docbridge_store::MemoryServer;

    fn doc(id: &str) -> Document {
        Document::new(DocumentId::from(id), Payload::from_static(b"{}"))
    }

    #[tokio::test]
    async fn test_faulty_store_rejects_only_the_nth_insert() {
        let server = MemoryServer::new();
        let connector = FaultyConnector::new(Arc::clone(&server)).fail_on(2);
        let conn = connector.connect(&memory_descriptor()).await.unwrap();
        let store = conn.create_store("s").await.unwrap();

        store.insert(&doc("a")).await.unwrap();
        assert!(matches!(
            store.insert(&doc("b")).await,
            Err(StoreError::InsertRejected { .. })
        ));
        store.insert(&doc("c")).await.unwrap();

        assert_eq!(connector.attempts(), 3);
        assert_eq!(server.documents("s").len(), 2);
    }

    #[tokio::test]
    async fn test_counter_outlives_connector() {
        let server = MemoryServer::new();
        let connector = FaultyConnector::new(Arc::clone(&server));
        let counter = connector.attempt_counter();

        let conn = connector.connect(&memory_descriptor()).await.unwrap();
        drop(connector);
        conn.create_store("s").await.unwrap().insert(&doc("a")).await.unwrap();

        assert_eq!(counter.get(), 1);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(10), || false).await);
        assert!(wait_until(Duration::from_millis(10), || true).await);
    }
}
