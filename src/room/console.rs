use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::room::sender::RoomSender;
use crate::utils::{BridgeError, Result};

/// Prints room messages to stdout as `[room] text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRooms;

#[async_trait]
impl RoomSender for ConsoleRooms {
    async fn send(&self, room_id: &str, text: &str) -> Result<()> {
        let mut out = String::new();
        for line in text.lines() {
            out.push_str(&format!("[{room_id}] {line}\n"));
        }

        let mut stdout = tokio::io::stdout();
        let written = async {
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await
        };
        written.await.map_err(|e| BridgeError::DeliveryFailed {
            room: room_id.to_string(),
            reason: e.to_string(),
        })
    }
}
