use async_trait::async_trait;

use crate::utils::Result;

/// Sends text into a chat room.
///
/// Failures are reported as `DeliveryFailed` and only affect this one
/// message to this one room.
#[async_trait]
pub trait RoomSender: Send + Sync {
    async fn send(&self, room_id: &str, text: &str) -> Result<()>;
}
