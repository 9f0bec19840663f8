//! Channel-backed rooms
//!
//! Each registered room has an unbounded channel; the chat client drains the
//! receiving end. A room that was never registered, or whose receiver is
//! gone, fails delivery.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::room::sender::RoomSender;
use crate::utils::{BridgeError, Result};

#[derive(Debug, Default)]
pub struct ChannelRooms {
    rooms: Mutex<HashMap<String, UnboundedSender<String>>>,
}

impl ChannelRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `room_id`, replacing any previous registration, and return
    /// the receiving end of its messages.
    pub fn register(&self, room_id: &str) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, room_id: &str) {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id);
    }
}

#[async_trait]
impl RoomSender for ChannelRooms {
    async fn send(&self, room_id: &str, text: &str) -> Result<()> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = rooms.get(room_id).ok_or_else(|| BridgeError::DeliveryFailed {
            room: room_id.to_string(),
            reason: "room is not registered".to_string(),
        })?;
        sender
            .send(text.to_string())
            .map_err(|_| BridgeError::DeliveryFailed {
                room: room_id.to_string(),
                reason: "room channel closed".to_string(),
            })
    }
}
