//! Fan-out of topic events to rooms
//!
//! An event is rendered once and sent to all subscribed rooms concurrently.
//! A failing room is logged and reported but never holds up the others.
//! Order per room is kept because the listener awaits `deliver` before it
//! hands over the next event of the same topic.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::bridge::topic::TopicKey;
use crate::dispatch::render::render_event;
use crate::persistence::SubscriptionStore;
use crate::room::RoomSender;
use crate::transport::NtfyEvent;
use crate::utils::BridgeError;

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, BridgeError)>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: SubscriptionStore,
    rooms: Arc<dyn RoomSender>,
}

impl Dispatcher {
    pub fn new(store: SubscriptionStore, rooms: Arc<dyn RoomSender>) -> Self {
        Self { store, rooms }
    }

    /// Send `event` to every room currently subscribed to `key`.
    pub async fn deliver(&self, key: &TopicKey, event: &NtfyEvent) -> DeliveryReport {
        let rooms = match self.store.rooms_for(key) {
            Ok(rooms) => rooms,
            Err(e) => {
                error!(topic = %key, error = %e, "could not resolve subscribed rooms");
                return DeliveryReport::default();
            }
        };
        if rooms.is_empty() {
            debug!(topic = %key, event_id = %event.id, "no rooms subscribed, dropping event");
            return DeliveryReport::default();
        }

        let text = render_event(key, event);
        let report = self.send_all(&rooms, &text).await;
        debug!(
            topic = %key,
            event_id = %event.id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "event dispatched"
        );
        report
    }

    /// Send the same `text` to each of `rooms`.
    pub async fn notify(&self, rooms: &BTreeSet<String>, text: &str) -> DeliveryReport {
        self.send_all(rooms, text).await
    }

    async fn send_all(&self, rooms: &BTreeSet<String>, text: &str) -> DeliveryReport {
        let sends = rooms.iter().map(|room| async move {
            let outcome = self.rooms.send(room, text).await;
            (room.clone(), outcome)
        });

        let mut report = DeliveryReport::default();
        for (room, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered.push(room),
                Err(e) => {
                    warn!(room_id = %room, error = %e, "delivery failed");
                    report.failed.push((room, e));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .finish()
    }
}
