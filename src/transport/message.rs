//! ntfy event definitions
//!
//! ntfy streams one JSON object per event. Only `message` events carry
//! content; `open` and `keepalive` merely show the stream is alive.
//!
//! ```text
//! {"id":"sPs71M8A2T","time":1643935928,"event":"message","topic":"alerts",
//!  "message":"disk full","title":"backup","tags":["warning","db"]}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Open,
    Keepalive,
    Message,
    PollRequest,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtfyEvent {
    pub id: String,
    pub time: i64,
    pub event: EventKind,
    pub topic: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub click: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl NtfyEvent {
    /// A plain `message` event, mostly useful for tests and local publishing.
    pub fn message(id: &str, topic: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            time: chrono::Utc::now().timestamp(),
            event: EventKind::Message,
            topic: topic.to_string(),
            message: Some(body.to_string()),
            title: None,
            tags: Vec::new(),
            priority: None,
            click: None,
            attachment: None,
        }
    }

    pub fn is_message(&self) -> bool {
        self.event == EventKind::Message
    }
}
