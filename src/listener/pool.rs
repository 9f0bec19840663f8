//! Listener pool
//!
//! Holds at most one `TopicConnection` per `TopicKey`. The pool never decides
//! on its own when to open or close a connection; the bridge does that from
//! the subscription counts, holding the per-topic lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use uuid::Uuid;

use crate::bridge::topic::TopicKey;
use crate::config::ListenerSettings;
use crate::listener::connection::{ConnectionInfo, TopicConnection};
use crate::listener::state::ConnectionState;
use crate::listener::EventSink;
use crate::persistence::SubscriptionStore;
use crate::transport::TopicSource;

pub struct ListenerPool {
    source: Arc<dyn TopicSource>,
    sink: Arc<dyn EventSink>,
    store: SubscriptionStore,
    settings: ListenerSettings,
    connections: Mutex<HashMap<TopicKey, TopicConnection>>,
}

impl ListenerPool {
    pub fn new(
        source: Arc<dyn TopicSource>,
        sink: Arc<dyn EventSink>,
        store: SubscriptionStore,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            settings,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Open a connection for `key` unless a live one exists, and return a
    /// watcher on its state.
    pub fn start(&self, key: &TopicKey) -> watch::Receiver<ConnectionState> {
        let mut connections = self.connections();
        if let Some(existing) = connections.get(key) {
            if !existing.state().is_closed() {
                return existing.watch();
            }
        }

        let connection = TopicConnection::spawn(
            key.clone(),
            self.source.clone(),
            self.sink.clone(),
            self.store.clone(),
            &self.settings,
        );
        let watcher = connection.watch();
        if let Some(stale) = connections.insert(key.clone(), connection) {
            stale.cancel();
        }
        watcher
    }

    /// Take the connection of `key` out of the pool. The caller closes it,
    /// outside of any lock the listener task might need.
    pub fn stop(&self, key: &TopicKey) -> Option<TopicConnection> {
        self.connections().remove(key)
    }

    /// Drop the entry of `key` if it still belongs to connection `id`.
    /// Used by a task that ended on its own; a newer connection is left alone.
    pub fn forget(&self, key: &TopicKey, id: Uuid) -> bool {
        let mut connections = self.connections();
        match connections.get(key) {
            Some(connection) if connection.id() == id => {
                connections.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn connection_id(&self, key: &TopicKey) -> Option<Uuid> {
        self.connections().get(key).map(TopicConnection::id)
    }

    pub fn state(&self, key: &TopicKey) -> Option<ConnectionState> {
        self.connections().get(key).map(TopicConnection::state)
    }

    pub fn watch(&self, key: &TopicKey) -> Option<watch::Receiver<ConnectionState>> {
        self.connections().get(key).map(TopicConnection::watch)
    }

    pub fn info(&self, key: &TopicKey) -> Option<ConnectionInfo> {
        self.connections().get(key).map(TopicConnection::info)
    }

    pub fn keys(&self) -> Vec<TopicKey> {
        self.connections().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every connection out of the pool, for shutdown.
    pub fn drain(&self) -> Vec<TopicConnection> {
        self.connections().drain().map(|(_, connection)| connection).collect()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<TopicKey, TopicConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ListenerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerPool")
            .field("connections", &self.keys())
            .finish()
    }
}
