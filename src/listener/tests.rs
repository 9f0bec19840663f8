use std::time::{Duration, Instant};

use tempfile::{TempDir, tempdir};

use crate::bridge::topic::TopicKey;
use crate::config::ListenerSettings;
use crate::listener::{Backoff, ConnectionState, ListenerPool, TopicConnection};
use crate::persistence::SubscriptionStore;
use crate::tests::scripted::{
    RecordingSink, ScriptedSource, Sunk, fast_listener_settings, next_sunk, wait_for_state,
};
use crate::transport::NtfyEvent;
use crate::utils::BridgeError;

fn subscribed_store(key: &TopicKey) -> (SubscriptionStore, TempDir) {
    let dir = tempdir().unwrap();
    let store = SubscriptionStore::open(dir.path().to_str().unwrap()).unwrap();
    store.add(key, "r1").unwrap();
    (store, dir)
}

fn alerts() -> TopicKey {
    TopicKey::parse("ntfy.sh/alerts").unwrap()
}

#[test]
fn test_backoff_doubles_up_to_cap() {
    let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
    let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(500),
            Duration::from_millis(500),
        ]
    );
    assert_eq!(backoff.attempts(), 5);

    backoff.reset();
    assert_eq!(backoff.attempts(), 0);
    assert_eq!(backoff.next_delay(), Duration::from_millis(100));
}

#[test]
fn test_state_names() {
    assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    assert_eq!(ConnectionState::Retrying.to_string(), "retrying");
    assert!(ConnectionState::Closed.is_closed());
    assert!(!ConnectionState::Active.is_closed());
}

#[tokio::test]
async fn test_connection_relays_messages_in_order() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    let feed = source.push_stream();
    let (sink, mut sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key.clone(), source.clone(), sink, store.clone(), &fast_listener_settings());
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Active).await;

    let mut keepalive = NtfyEvent::message("k", "alerts", "");
    keepalive.event = crate::transport::EventKind::Keepalive;
    feed.unbounded_send(Ok(keepalive)).unwrap();
    for (id, body) in [("1", "one"), ("2", "two"), ("3", "three")] {
        feed.unbounded_send(Ok(NtfyEvent::message(id, "alerts", body)))
            .unwrap();
    }

    let mut bodies = Vec::new();
    for _ in 0..3 {
        match next_sunk(&mut sunk).await {
            Sunk::Event(k, event) => {
                assert_eq!(k, key);
                bodies.push(event.message.unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(bodies, vec!["one", "two", "three"]);
    assert_eq!(store.last_event_id(&key).unwrap().as_deref(), Some("3"));
    assert!(connection.info().last_seen.is_some());

    assert_eq!(connection.close().await, ConnectionState::Closed);
}

#[tokio::test]
async fn test_reconnects_after_stream_loss_and_resumes() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    let first = source.push_stream();
    let second = source.push_stream();
    let (sink, mut sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key.clone(), source.clone(), sink, store, &fast_listener_settings());
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Active).await;

    first
        .unbounded_send(Ok(NtfyEvent::message("abc", "alerts", "before")))
        .unwrap();
    assert!(matches!(next_sunk(&mut sunk).await, Sunk::Event(..)));

    drop(first);
    wait_for_state(&mut watcher, ConnectionState::Retrying).await;
    wait_for_state(&mut watcher, ConnectionState::Active).await;

    second
        .unbounded_send(Ok(NtfyEvent::message("def", "alerts", "after")))
        .unwrap();
    match next_sunk(&mut sunk).await {
        Sunk::Event(_, event) => assert_eq!(event.message.as_deref(), Some("after")),
        other => panic!("unexpected {other:?}"),
    }

    let opens = source.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].1, None);
    assert_eq!(opens[1].1.as_deref(), Some("abc"));
    assert_eq!(connection.info().reconnects, 1);

    connection.close().await;
}

#[tokio::test]
async fn test_transient_failures_retry_until_connected() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_failure(BridgeError::ConnectionFailed("refused".into()));
    source.push_failure(BridgeError::ConnectionFailed("503".into()));
    let _feed = source.push_stream();
    let (sink, _sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key, source.clone(), sink, store, &fast_listener_settings());
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Active).await;

    assert_eq!(source.opens().len(), 3);
    assert_eq!(connection.info().reconnects, 0);
    connection.close().await;
}

#[tokio::test]
async fn test_rejection_closes_and_reports_once() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_failure(BridgeError::ConnectionRejected("server answered 403 Forbidden".into()));
    let (sink, mut sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key.clone(), source.clone(), sink, store, &fast_listener_settings());
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Closed).await;

    match next_sunk(&mut sunk).await {
        Sunk::Rejected(k, id, reason) => {
            assert_eq!(k, key);
            assert_eq!(id, connection.id());
            assert!(reason.contains("403"));
        }
        other => panic!("unexpected {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sunk.try_recv().is_err());
    assert_eq!(source.opens().len(), 1);
}

#[tokio::test]
async fn test_non_retryable_source_error_ends_listener() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_failure(BridgeError::InvalidTarget("ntfy.sh/alerts".into()));
    let (sink, mut sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key.clone(), source.clone(), sink, store, &fast_listener_settings());
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Closed).await;

    match next_sunk(&mut sunk).await {
        Sunk::Rejected(k, _, reason) => {
            assert_eq!(k, key);
            assert!(reason.contains("invalid topic"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(source.opens().len(), 1);
}

#[tokio::test]
async fn test_close_interrupts_backoff_promptly() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_failure(BridgeError::ConnectionFailed("refused".into()));
    let (sink, _sunk) = RecordingSink::new();
    let settings = ListenerSettings {
        initial_backoff_ms: 60_000,
        max_backoff_ms: 60_000,
        ..fast_listener_settings()
    };

    let connection = TopicConnection::spawn(key, source, sink, store, &settings);
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Retrying).await;

    let started = Instant::now();
    assert_eq!(connection.close().await, ConnectionState::Closed);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(*watcher.borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_close_interrupts_pending_connect() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_hang();
    let (sink, _sunk) = RecordingSink::new();

    let connection =
        TopicConnection::spawn(key, source.clone(), sink, store, &fast_listener_settings());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(connection.state(), ConnectionState::Connecting);

    let started = Instant::now();
    connection.close().await;
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_idle_stream_is_replaced() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    let _silent = source.push_stream();
    let (sink, _sunk) = RecordingSink::new();
    let settings = ListenerSettings {
        idle_timeout_secs: 1,
        ..fast_listener_settings()
    };

    let connection = TopicConnection::spawn(key, source.clone(), sink, store, &settings);
    let mut watcher = connection.watch();
    wait_for_state(&mut watcher, ConnectionState::Active).await;
    wait_for_state(&mut watcher, ConnectionState::Retrying).await;
    wait_for_state(&mut watcher, ConnectionState::Active).await;

    assert_eq!(source.opens().len(), 2);
    connection.close().await;
}

#[tokio::test]
async fn test_pool_keeps_one_connection_per_topic() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    let (sink, _sunk) = RecordingSink::new();
    let pool = ListenerPool::new(source.clone(), sink, store, fast_listener_settings());

    let mut watcher = pool.start(&key);
    wait_for_state(&mut watcher, ConnectionState::Active).await;
    let id = pool.connection_id(&key).unwrap();

    pool.start(&key);
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.connection_id(&key), Some(id));
    assert_eq!(source.opens().len(), 1);

    let other = TopicKey::parse("ntfy.sh/builds").unwrap();
    pool.start(&other);
    assert_eq!(pool.len(), 2);

    assert!(!pool.forget(&key, uuid::Uuid::new_v4()));
    assert_eq!(pool.len(), 2);

    let connection = pool.stop(&key).unwrap();
    assert_eq!(connection.close().await, ConnectionState::Closed);
    assert_eq!(pool.state(&key), None);
    assert_eq!(pool.keys(), vec![other]);

    for connection in pool.drain() {
        connection.close().await;
    }
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_pool_replaces_closed_connection() {
    let key = alerts();
    let (store, _dir) = subscribed_store(&key);
    let source = ScriptedSource::new();
    source.push_failure(BridgeError::ConnectionRejected("gone".into()));
    let (sink, mut sunk) = RecordingSink::new();
    let pool = ListenerPool::new(source.clone(), sink, store, fast_listener_settings());

    let mut watcher = pool.start(&key);
    wait_for_state(&mut watcher, ConnectionState::Closed).await;
    let rejected_id = match next_sunk(&mut sunk).await {
        Sunk::Rejected(_, id, _) => id,
        other => panic!("unexpected {other:?}"),
    };

    let mut watcher = pool.start(&key);
    wait_for_state(&mut watcher, ConnectionState::Active).await;
    assert_ne!(pool.connection_id(&key), Some(rejected_id));
    assert!(!pool.forget(&key, rejected_id));
}
