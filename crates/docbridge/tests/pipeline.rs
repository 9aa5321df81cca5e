//! End-to-end pipeline tests over the in-memory broker, with in-memory and
//! SQLite stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use docbridge::broker::{BrokerConnector, MemoryBroker};
use docbridge::core::{IdStrategy, Payload};
use docbridge::store::{
    Connection, Connector, DocumentStore, MemoryServer, SqliteConnector, StoreError,
};
use docbridge::{Bridge, BridgeConfig, BridgeError, BridgeReport, RelayError, RelayStats};
use docbridge_testkit::{payload_sequence, subscribed, wait_until, FaultyConnector, TEST_PASSWORD};
use proptest::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

fn config(topic: &str) -> BridgeConfig {
    BridgeConfig {
        password: TEST_PASSWORD.into(),
        store_name: "sensors".into(),
        mqtt_topic: topic.into(),
        idle_interval_ms: 1,
        ..BridgeConfig::default()
    }
}

/// A bridge running in its own task, stopped through a oneshot.
struct Running {
    handle: JoinHandle<docbridge::Result<BridgeReport>>,
    stop: oneshot::Sender<()>,
    stats: Arc<RelayStats>,
}

impl Running {
    fn start<C, B>(bridge: Bridge<C, B>) -> Self
    where
        C: Connector + 'static,
        B: BrokerConnector + 'static,
    {
        let stats = bridge.stats();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(bridge.run(async move {
            let _ = stopped.await;
        }));
        Self { handle, stop, stats }
    }

    async fn shutdown(self) -> docbridge::Result<BridgeReport> {
        let _ = self.stop.send(());
        self.handle.await.expect("bridge task panicked")
    }
}

#[tokio::test]
async fn test_payloads_stored_in_arrival_order() {
    let server = MemoryServer::new();
    let broker = MemoryBroker::new();
    let running = Running::start(Bridge::new(
        Arc::clone(&server),
        Arc::clone(&broker),
        config("mac/Processes"),
    ));
    assert!(subscribed(&broker, "mac/Processes").await);

    let bodies = [r#"{"pid":1}"#, r#"{"pid":2}"#, "", r#"{"pid":4}"#];
    for body in bodies {
        broker.publish("mac/Processes", Payload::from(body));
    }
    // Other topics are not relayed.
    broker.publish("mac/Memory", Payload::from_static(b"ignored"));

    let stats = Arc::clone(&running.stats);
    assert!(wait_until(WAIT, || stats.stored() == 4).await);

    let report = running.shutdown().await.unwrap();
    assert_eq!(report.stored, 4);
    assert_eq!(report.received, 4);

    let stored: Vec<_> = server
        .documents("sensors")
        .into_iter()
        .map(|d| String::from_utf8(d.body().to_vec()).unwrap())
        .collect();
    assert_eq!(stored, bodies);
    assert_eq!(server.close_count(), 1);
}

/// Publishes five payloads through a store that rejects the third insert.
async fn assert_third_insert_stops_pipeline() {
    let server = MemoryServer::new();
    let broker = MemoryBroker::new();
    let connector = FaultyConnector::new(Arc::clone(&server)).fail_on(3);
    let attempts = connector.attempt_counter();

    let bridge = Bridge::new(connector, Arc::clone(&broker), config("t"));
    let handle = tokio::spawn(bridge.run(std::future::pending()));
    assert!(subscribed(&broker, "t").await);

    for n in 1..=5 {
        broker.publish("t", Payload::from(format!(r#"{{"n":{n}}}"#)));
    }

    let err = handle.await.unwrap().unwrap_err();
    match err {
        BridgeError::Relay(RelayError::Insert { source, .. }) => {
            assert!(matches!(source, StoreError::InsertRejected { .. }));
        }
        other => panic!("expected insert failure, got {other:?}"),
    }

    // #4 and #5 were never attempted.
    assert_eq!(attempts.get(), 3);
    let stored: Vec<_> = server
        .documents("sensors")
        .into_iter()
        .map(|d| d.body().clone())
        .collect();
    assert_eq!(stored, vec![Payload::from(r#"{"n":1}"#), Payload::from(r#"{"n":2}"#)]);
    assert_eq!(server.close_count(), 1);
}

#[tokio::test]
async fn test_insert_failure_stops_pipeline() {
    assert_third_insert_stops_pipeline().await;
}

// The subscriber stops as soon as the failed relay drops the channel, so both
// stages end together. The insert error must win every time.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_insert_failure_reported_on_every_run() {
    for _ in 0..50 {
        assert_third_insert_stops_pipeline().await;
    }
}

#[tokio::test]
async fn test_store_created_once_across_runs() {
    let server = MemoryServer::new();
    let broker = MemoryBroker::new();

    for _ in 0..2 {
        let running = Running::start(Bridge::new(
            Arc::clone(&server),
            Arc::clone(&broker),
            config("t"),
        ));
        assert!(subscribed(&broker, "t").await);
        running.shutdown().await.unwrap();
        broker.disconnect_all();
    }

    assert_eq!(server.create_count(), 1);
    assert_eq!(server.connect_count(), 2);
    assert_eq!(server.close_count(), 2);
}

#[tokio::test]
async fn test_broker_session_end_stops_pipeline() {
    let server = MemoryServer::new();
    let broker = MemoryBroker::new();
    let bridge = Bridge::new(Arc::clone(&server), Arc::clone(&broker), config("t"));
    let handle = tokio::spawn(bridge.run(std::future::pending()));
    assert!(subscribed(&broker, "t").await);

    broker.disconnect_all();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::SubscriberStopped));
    assert_eq!(server.close_count(), 1);
}

#[tokio::test]
async fn test_unreachable_store_fails_before_broker() {
    let server = MemoryServer::new();
    server.set_unreachable(true);
    let broker = MemoryBroker::new();

    let err = Bridge::new(Arc::clone(&server), Arc::clone(&broker), config("t"))
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Store(StoreError::Unreachable { .. })));
    assert_eq!(broker.connect_count(), 0);
    assert_eq!(server.close_count(), 0);
}

#[tokio::test]
async fn test_uuid_identities_are_distinct() {
    let server = MemoryServer::new();
    let broker = MemoryBroker::new();
    let config = BridgeConfig {
        id_strategy: IdStrategy::Uuid,
        ..config("t")
    };
    let running = Running::start(Bridge::new(Arc::clone(&server), Arc::clone(&broker), config));
    assert!(subscribed(&broker, "t").await);

    for _ in 0..20 {
        broker.publish("t", Payload::from_static(b"same"));
    }
    let stats = Arc::clone(&running.stats);
    assert!(wait_until(WAIT, || stats.stored() == 20).await);
    running.shutdown().await.unwrap();

    let ids: HashSet<_> = server
        .documents("sensors")
        .iter()
        .map(|d| d.id().clone())
        .collect();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_sqlite_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.db");
    let config = BridgeConfig {
        store_url: path.to_string_lossy().into_owned(),
        ..config("mac/Processes")
    };
    let broker = MemoryBroker::new();

    let running = Running::start(Bridge::new(SqliteConnector, Arc::clone(&broker), config.clone()));
    assert!(subscribed(&broker, "mac/Processes").await);

    let bodies = [&b"alpha"[..], b"", b"gamma"];
    for body in bodies {
        broker.publish("mac/Processes", Payload::copy_from_slice(body));
    }
    let stats = Arc::clone(&running.stats);
    assert!(wait_until(WAIT, || stats.stored() == 3).await);
    assert_eq!(running.shutdown().await.unwrap().stored, 3);
    broker.disconnect_all();

    // A second run opens the existing store instead of creating it.
    let running = Running::start(Bridge::new(SqliteConnector, Arc::clone(&broker), config.clone()));
    assert!(subscribed(&broker, "mac/Processes").await);
    assert_eq!(running.shutdown().await.unwrap().stored, 0);

    let conn = SqliteConnector.connect(&config.descriptor().unwrap()).await.unwrap();
    let store = conn.get_store(&config.store_name).await.unwrap();
    let ids = store.list_ids().await.unwrap();
    assert_eq!(ids.len(), 3);
    for (id, expected) in ids.iter().zip(bodies) {
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.body().as_ref(), expected);
    }
    conn.close().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_fifo_for_any_payload_sequence(payloads in payload_sequence(12, 32)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let stored = runtime.block_on(async {
            let server = MemoryServer::new();
            let broker = MemoryBroker::new();
            let running = Running::start(Bridge::new(
                Arc::clone(&server),
                Arc::clone(&broker),
                config("t"),
            ));
            assert!(subscribed(&broker, "t").await);

            for payload in &payloads {
                broker.publish("t", payload.clone());
            }
            let stats = Arc::clone(&running.stats);
            let expected = payloads.len() as u64;
            assert!(wait_until(WAIT, || stats.stored() == expected).await);
            running.shutdown().await.unwrap();

            server
                .documents("sensors")
                .into_iter()
                .map(|d| d.body().clone())
                .collect::<Vec<_>>()
        });

        prop_assert_eq!(stored, payloads);
    }
}
