//! End-to-end runs against the in-process ntfy server over real WebSockets.

use std::sync::Arc;
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::bridge::{Bridge, TopicKey};
use crate::listener::ConnectionState;
use crate::persistence::SubscriptionStore;
use crate::room::ChannelRooms;
use crate::tests::fake_ntfy::FakeNtfy;
use crate::tests::scripted::{fast_settings, wait_for_state};
use crate::transport::{NtfyEvent, WebSocketSource};

struct Setup {
    ntfy: FakeNtfy,
    bridge: Bridge,
    store: SubscriptionStore,
    rooms: Arc<ChannelRooms>,
    _dir: TempDir,
}

async fn setup() -> Setup {
    let ntfy = FakeNtfy::start().await;
    let dir = tempdir().unwrap();
    let store = SubscriptionStore::open(dir.path().to_str().unwrap()).unwrap();
    let rooms = Arc::new(ChannelRooms::new());
    let bridge = bridge_over(&store, &rooms);
    Setup {
        ntfy,
        bridge,
        store,
        rooms,
        _dir: dir,
    }
}

fn bridge_over(store: &SubscriptionStore, rooms: &Arc<ChannelRooms>) -> Bridge {
    let settings = fast_settings();
    let source = Arc::new(WebSocketSource::new(&settings.listener));
    Bridge::new(&settings, store.clone(), rooms.clone(), source)
}

async fn recv(rx: &mut UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("room received nothing")
        .expect("room channel closed")
}

async fn wait_for_requests(ntfy: &FakeNtfy, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while ntfy.requests().len() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server never saw the expected handshakes");
}

#[tokio::test]
async fn test_two_rooms_share_a_topic_until_both_leave() {
    let s = setup().await;
    let target = format!("{}/alerts", s.ntfy.server());
    let key = TopicKey::parse(&target).unwrap();
    let mut r1 = s.rooms.register("R1");
    let mut r2 = s.rooms.register("R2");

    let first = s.bridge.subscribe("R1", &target).await.unwrap();
    assert!(first.first);
    assert_eq!(first.state, ConnectionState::Active);
    assert_eq!(s.bridge.refcount(&key).unwrap(), 1);
    s.ntfy.wait_for_open(1).await;

    s.ntfy.publish(&NtfyEvent::message("e1", "alerts", "disk full"));
    let text = recv(&mut r1).await;
    assert!(text.contains(&format!("ntfy message in topic {key}")));
    assert!(text.contains("disk full"));

    let second = s.bridge.subscribe("R2", &target).await.unwrap();
    assert!(!second.first);
    assert_eq!(second.subscribers, 2);
    assert_eq!(s.bridge.active_connections(), 1);
    assert_eq!(s.ntfy.open_connections(), 1);

    s.ntfy.publish(&NtfyEvent::message("e2", "alerts", "disk still full"));
    assert!(recv(&mut r1).await.contains("disk still full"));
    assert!(recv(&mut r2).await.contains("disk still full"));

    s.bridge.unsubscribe("R1", &target).await.unwrap();
    assert_eq!(s.bridge.connection_state(&key), Some(ConnectionState::Active));
    let mut watcher = s.bridge.watch(&key).unwrap();

    let last = s.bridge.unsubscribe("R2", &target).await.unwrap();
    assert!(last.connection_closed);
    wait_for_state(&mut watcher, ConnectionState::Closed).await;
    s.ntfy.wait_for_open(0).await;
    assert!(s.store.topics().unwrap().is_empty());
}

#[tokio::test]
async fn test_forbidden_topic_unsubscribes_every_room() {
    let s = setup().await;
    let target = format!("{}/forbidden", s.ntfy.server());
    let key = TopicKey::parse(&target).unwrap();
    let mut r1 = s.rooms.register("R1");

    let subscribed = s.bridge.subscribe("R1", &target).await.unwrap();
    assert_eq!(subscribed.state, ConnectionState::Closed);

    let notice = recv(&mut r1).await;
    assert!(notice.contains("403"));
    assert!(notice.contains(&key.to_string()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(r1.try_recv().is_err());
    assert_eq!(s.bridge.refcount(&key).unwrap(), 0);
    assert_eq!(s.bridge.active_connections(), 0);
    assert_eq!(s.ntfy.requests().len(), 1);
}

#[tokio::test]
async fn test_reconnects_after_server_drop_and_resumes_from_last_event() {
    let s = setup().await;
    let target = format!("{}/alerts", s.ntfy.server());
    let mut r1 = s.rooms.register("R1");

    s.bridge.subscribe("R1", &target).await.unwrap();
    s.ntfy.wait_for_open(1).await;
    s.ntfy.publish(&NtfyEvent::message("e1", "alerts", "before"));
    assert!(recv(&mut r1).await.contains("before"));

    s.ntfy.kick();
    wait_for_requests(&s.ntfy, 2).await;
    s.ntfy.wait_for_open(1).await;
    assert!(s.ntfy.requests()[1].ends_with("/alerts/ws?since=e1"));

    s.ntfy.publish(&NtfyEvent::message("e2", "alerts", "after"));
    assert!(recv(&mut r1).await.contains("after"));
}

#[tokio::test]
async fn test_restart_resumes_stored_subscriptions() {
    let s = setup().await;
    let target = format!("{}/alerts", s.ntfy.server());
    let mut r1 = s.rooms.register("R1");

    s.bridge.subscribe("R1", &target).await.unwrap();
    s.ntfy.wait_for_open(1).await;
    s.ntfy.publish(&NtfyEvent::message("e1", "alerts", "before restart"));
    assert!(recv(&mut r1).await.contains("before restart"));

    s.bridge.shutdown().await;
    s.ntfy.wait_for_open(0).await;

    let restarted = bridge_over(&s.store, &s.rooms);
    assert_eq!(restarted.resume().await.unwrap(), 1);
    wait_for_requests(&s.ntfy, 2).await;
    s.ntfy.wait_for_open(1).await;
    assert!(s.ntfy.requests()[1].ends_with("?since=e1"));

    s.ntfy.publish(&NtfyEvent::message("e2", "alerts", "after restart"));
    assert!(recv(&mut r1).await.contains("after restart"));
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_gone_room_releases_its_connection() {
    let s = setup().await;
    let target = format!("{}/alerts", s.ntfy.server());

    s.bridge.subscribe("R1", &target).await.unwrap();
    s.ntfy.wait_for_open(1).await;

    let closed = s.bridge.room_gone("R1").await.unwrap();
    assert_eq!(closed.len(), 1);
    s.ntfy.wait_for_open(0).await;
    assert!(s.bridge.subscriptions("R1").unwrap().is_empty());
}
