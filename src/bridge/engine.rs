//! Subscription lifecycle
//!
//! Every command on a topic runs under that topic's lock, so a teardown for
//! the last unsubscribe and a start for the next first subscribe never
//! interleave. Locks are released before waiting on a connection: a listener
//! reporting a rejection needs the same lock.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::locks::KeyLocks;
use crate::bridge::topic::TopicKey;
use crate::config::{BridgeSettings, Settings};
use crate::dispatch::Dispatcher;
use crate::dispatch::render::render_rejection;
use crate::listener::{ConnectionInfo, ConnectionState, EventSink, ListenerPool, TopicConnection};
use crate::persistence::SubscriptionStore;
use crate::room::RoomSender;
use crate::transport::{NtfyEvent, TopicSource};
use crate::utils::{BridgeError, Result};

/// Result of a successful `subscribe`.
#[derive(Debug, Clone)]
pub struct Subscribed {
    pub key: TopicKey,
    /// This room is the topic's first subscriber.
    pub first: bool,
    /// Connection state once the first attempt settled, or when the wait ran out.
    pub state: ConnectionState,
    pub subscribers: usize,
}

/// Result of a successful `unsubscribe`.
#[derive(Debug, Clone)]
pub struct Unsubscribed {
    pub key: TopicKey,
    pub remaining: usize,
    pub connection_closed: bool,
}

struct Shared {
    store: SubscriptionStore,
    pool: ListenerPool,
    dispatcher: Dispatcher,
    locks: KeyLocks,
    settings: BridgeSettings,
}

#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    pub fn new(
        settings: &Settings,
        store: SubscriptionStore,
        rooms: Arc<dyn RoomSender>,
        source: Arc<dyn TopicSource>,
    ) -> Self {
        let shared = Arc::new_cyclic(|shared: &Weak<Shared>| {
            let relay = Arc::new(Relay {
                shared: shared.clone(),
            });
            Shared {
                store: store.clone(),
                pool: ListenerPool::new(source, relay, store.clone(), settings.listener.clone()),
                dispatcher: Dispatcher::new(store, rooms),
                locks: KeyLocks::default(),
                settings: settings.bridge.clone(),
            }
        });
        Self { shared }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.shared.settings
    }

    /// Subscribe `room_id` to `target` (`<server>/<topic>`).
    ///
    /// The first subscriber of a topic opens its connection and waits, up to
    /// the configured acknowledgement time, for the first attempt to settle.
    pub async fn subscribe(&self, room_id: &str, target: &str) -> Result<Subscribed> {
        let key = TopicKey::parse(target)?;
        validate_room(room_id)?;
        let shared = &self.shared;

        let (first, subscribers, mut watcher) = {
            let _guard = shared.locks.lock(&key).await;
            let first = shared.store.add(&key, room_id)?;
            let watcher = shared.pool.start(&key);
            let subscribers = shared.store.rooms_for(&key)?.len();
            (first, subscribers, watcher)
        };

        if first {
            let settled = watcher.wait_for(|state| *state != ConnectionState::Connecting);
            if tokio::time::timeout(shared.settings.subscribe_ack(), settled)
                .await
                .is_err()
            {
                debug!(topic = %key, "first connection attempt still pending");
            }
        }
        let state = *watcher.borrow();

        info!(topic = %key, room_id = %room_id, first, %state, subscribers, "room subscribed");
        Ok(Subscribed {
            key,
            first,
            state,
            subscribers,
        })
    }

    /// Unsubscribe `room_id` from `target`. The last subscriber closes the
    /// topic's connection and waits for it to stop.
    pub async fn unsubscribe(&self, room_id: &str, target: &str) -> Result<Unsubscribed> {
        let key = TopicKey::parse(target)?;
        validate_room(room_id)?;
        let shared = &self.shared;

        let (remaining, connection) = {
            let _guard = shared.locks.lock(&key).await;
            if shared.store.remove(&key, room_id)? {
                (0, shared.pool.stop(&key))
            } else {
                (shared.store.rooms_for(&key)?.len(), None)
            }
        };

        let connection_closed = remaining == 0;
        if let Some(connection) = connection {
            connection.close().await;
        }

        info!(topic = %key, room_id = %room_id, remaining, "room unsubscribed");
        Ok(Unsubscribed {
            key,
            remaining,
            connection_closed,
        })
    }

    /// Topics `room_id` is subscribed to, with their connection if one is open.
    pub fn subscriptions(&self, room_id: &str) -> Result<Vec<(TopicKey, Option<ConnectionInfo>)>> {
        validate_room(room_id)?;
        let topics = self.shared.store.topics_for(room_id)?;
        Ok(topics
            .into_iter()
            .map(|key| {
                let info = self.shared.pool.info(&key);
                (key, info)
            })
            .collect())
    }

    /// Open a connection for every topic in the store. Called once at start.
    pub async fn resume(&self) -> Result<usize> {
        let topics = self.shared.store.topics()?;
        for key in &topics {
            let _guard = self.shared.locks.lock(key).await;
            self.shared.pool.start(key);
        }
        info!(topics = topics.len(), "resumed stored subscriptions");
        Ok(topics.len())
    }

    /// The chat client reports `room_id` as permanently unreachable: drop all
    /// of its subscriptions and close the connections nobody else needs.
    pub async fn room_gone(&self, room_id: &str) -> Result<Vec<TopicKey>> {
        validate_room(room_id)?;
        let shared = &self.shared;

        let topics = shared.store.topics_for(room_id)?;
        let (emptied, connections) = {
            let _guards = shared.locks.lock_all(&topics).await;
            let emptied = shared.store.remove_subscriptions(room_id, &topics)?;
            let connections: Vec<TopicConnection> =
                emptied.iter().filter_map(|key| shared.pool.stop(key)).collect();
            (emptied, connections)
        };
        join_all(connections.into_iter().map(TopicConnection::close)).await;

        info!(room_id = %room_id, topics = topics.len(), closed = emptied.len(), "room removed");
        Ok(emptied)
    }

    pub fn connection_state(&self, key: &TopicKey) -> Option<ConnectionState> {
        self.shared.pool.state(key)
    }

    /// Follow the state of the connection of `key`, if one is open.
    pub fn watch(&self, key: &TopicKey) -> Option<watch::Receiver<ConnectionState>> {
        self.shared.pool.watch(key)
    }

    /// Number of rooms subscribed to `key`.
    pub fn refcount(&self, key: &TopicKey) -> Result<usize> {
        Ok(self.shared.store.rooms_for(key)?.len())
    }

    pub fn active_connections(&self) -> usize {
        self.shared.pool.len()
    }

    /// Close every connection. Subscriptions stay in the store for the next
    /// `resume`.
    pub async fn shutdown(&self) {
        let connections = self.shared.pool.drain();
        let count = connections.len();
        join_all(connections.into_iter().map(TopicConnection::close)).await;
        info!(connections = count, "bridge shut down");
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("store", &self.shared.store)
            .field("pool", &self.shared.pool)
            .finish()
    }
}

fn validate_room(room_id: &str) -> Result<()> {
    if room_id.trim().is_empty() || room_id.contains('\0') {
        return Err(BridgeError::InvalidRoom(room_id.to_string()));
    }
    Ok(())
}

/// Feeds listener output back into the bridge.
struct Relay {
    shared: Weak<Shared>,
}

#[async_trait]
impl EventSink for Relay {
    async fn event(&self, key: &TopicKey, event: NtfyEvent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.dispatcher.deliver(key, &event).await;
    }

    async fn rejected(&self, key: &TopicKey, connection_id: Uuid, reason: String) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let rooms: BTreeSet<String> = {
            let _guard = shared.locks.lock(key).await;
            if shared.pool.connection_id(key) != Some(connection_id) {
                debug!(topic = %key, connection = %connection_id, "ignoring rejection from a replaced connection");
                return;
            }
            match shared.store.remove_topic(key) {
                Ok(rooms) => {
                    shared.pool.forget(key, connection_id);
                    rooms
                }
                Err(e) => {
                    // the closed connection stays in the pool; the next
                    // subscribe or resume of the topic replaces it
                    error!(topic = %key, error = %e, "could not drop subscriptions of rejected topic");
                    return;
                }
            }
        };

        warn!(topic = %key, rooms = rooms.len(), %reason, "topic rejected, subscriptions removed");
        let text = render_rejection(key, &reason);
        shared.dispatcher.notify(&rooms, &text).await;
    }
}
