//! A single topic connection
//!
//! `TopicConnection` is the handle the pool keeps; the spawned `Worker` owns
//! the socket. The worker observes the cancellation token at every await
//! point (connect, read, backoff) and the socket is dropped on every exit
//! path, so `close` releases the connection promptly.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::bridge::topic::TopicKey;
use crate::config::ListenerSettings;
use crate::listener::backoff::Backoff;
use crate::listener::state::ConnectionState;
use crate::listener::EventSink;
use crate::persistence::SubscriptionStore;
use crate::transport::{EventStream, TopicSource};
use crate::utils::BridgeError;

#[derive(Debug, Default)]
struct Status {
    last_seen: Option<DateTime<Utc>>,
    reconnects: u32,
}

/// Snapshot of a connection for listing and diagnostics.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub key: TopicKey,
    pub id: Uuid,
    pub state: ConnectionState,
    pub last_seen: Option<DateTime<Utc>>,
    pub reconnects: u32,
}

#[derive(Debug)]
pub struct TopicConnection {
    key: TopicKey,
    id: Uuid,
    state: Arc<watch::Sender<ConnectionState>>,
    status: Arc<Mutex<Status>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    close_timeout: Duration,
}

impl TopicConnection {
    /// Spawn the listener task for `key`. Starts in `Connecting`.
    pub fn spawn(
        key: TopicKey,
        source: Arc<dyn TopicSource>,
        sink: Arc<dyn EventSink>,
        store: SubscriptionStore,
        settings: &ListenerSettings,
    ) -> Self {
        let id = Uuid::new_v4();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        let status = Arc::new(Mutex::new(Status::default()));
        let cancel = CancellationToken::new();

        let worker = Worker {
            key: key.clone(),
            id,
            source,
            sink,
            store,
            state: state.clone(),
            status: status.clone(),
            cancel: cancel.clone(),
            backoff: Backoff::new(settings.initial_backoff(), settings.max_backoff()),
            idle_timeout: settings.idle_timeout(),
        };
        let task = tokio::spawn(worker.run());

        Self {
            key,
            id,
            state,
            status,
            cancel,
            task,
            close_timeout: settings.close_timeout(),
        }
    }

    pub fn key(&self) -> &TopicKey {
        &self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn info(&self) -> ConnectionInfo {
        let status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        ConnectionInfo {
            key: self.key.clone(),
            id: self.id,
            state: self.state(),
            last_seen: status.last_seen,
            reconnects: status.reconnects,
        }
    }

    /// Ask the task to stop without waiting for it.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for it to release the socket. A task stuck in
    /// a room delivery past the close timeout is aborted.
    pub async fn close(self) -> ConnectionState {
        self.cancel.cancel();
        let mut task = self.task;
        if tokio::time::timeout(self.close_timeout, &mut task).await.is_err() {
            warn!(topic = %self.key, connection = %self.id, "listener did not stop in time, aborting");
            task.abort();
        }
        self.state.send_replace(ConnectionState::Closed);
        ConnectionState::Closed
    }
}

enum Exit {
    Cancelled,
    Rejected(String),
}

enum Pump {
    Cancelled,
    Disconnected(String),
}

struct Worker {
    key: TopicKey,
    id: Uuid,
    source: Arc<dyn TopicSource>,
    sink: Arc<dyn EventSink>,
    store: SubscriptionStore,
    state: Arc<watch::Sender<ConnectionState>>,
    status: Arc<Mutex<Status>>,
    cancel: CancellationToken,
    backoff: Backoff,
    idle_timeout: Option<Duration>,
}

impl Worker {
    async fn run(mut self) {
        info!(topic = %self.key, connection = %self.id, "listener started");
        let mut connected_once = false;

        let exit = loop {
            let since = match self.store.last_event_id(&self.key) {
                Ok(since) => since,
                Err(e) => {
                    warn!(topic = %self.key, error = %e, "could not read resume position");
                    None
                }
            };

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Exit::Cancelled,
                opened = self.source.open(&self.key, since.as_deref()) => opened,
            };

            match opened {
                Ok(stream) => {
                    if connected_once {
                        self.with_status(|s| s.reconnects += 1);
                        info!(topic = %self.key, attempts = self.backoff.attempts(), "reconnected");
                    }
                    connected_once = true;
                    self.backoff.reset();
                    self.state.send_replace(ConnectionState::Active);

                    match self.pump(stream).await {
                        Pump::Cancelled => break Exit::Cancelled,
                        Pump::Disconnected(reason) => {
                            warn!(topic = %self.key, %reason, "stream lost");
                        }
                    }
                }
                Err(e) if !e.is_transient() => {
                    break Exit::Rejected(match e {
                        BridgeError::ConnectionRejected(reason) => reason,
                        other => other.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        topic = %self.key,
                        error = %e,
                        attempt = self.backoff.attempts() + 1,
                        "connection attempt failed"
                    );
                }
            }

            self.state.send_replace(ConnectionState::Retrying);
            let delay = self.backoff.next_delay();
            debug!(topic = %self.key, ?delay, "waiting before reconnect");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Exit::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.state.send_replace(ConnectionState::Closed);
        match exit {
            Exit::Cancelled => info!(topic = %self.key, connection = %self.id, "listener stopped"),
            Exit::Rejected(reason) => {
                warn!(topic = %self.key, %reason, "topic rejected by server");
                self.sink.rejected(&self.key, self.id, reason).await;
            }
        }
    }

    /// Read events until the stream dies or the connection is cancelled.
    async fn pump(&mut self, mut stream: EventStream) -> Pump {
        let idle = self.idle_timeout;

        loop {
            let next = async {
                match idle {
                    Some(limit) => tokio::time::timeout(limit, stream.next()).await.ok(),
                    None => Some(stream.next().await),
                }
            };

            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Pump::Cancelled,
                item = next => item,
            };

            let event = match item {
                None => return Pump::Disconnected("idle timeout elapsed".to_string()),
                Some(None) => return Pump::Disconnected("closed by server".to_string()),
                Some(Some(Err(e))) => return Pump::Disconnected(e.to_string()),
                Some(Some(Ok(event))) => event,
            };

            self.with_status(|s| s.last_seen = Some(Utc::now()));
            if !event.is_message() {
                trace!(topic = %self.key, kind = ?event.event, "control event");
                continue;
            }

            if let Err(e) = self.store.record_event(&self.key, &event.id, event.time) {
                warn!(topic = %self.key, error = %e, "could not record resume position");
            }
            self.sink.event(&self.key, event).await;
        }
    }

    fn with_status(&self, update: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut status);
    }
}
