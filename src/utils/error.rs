//! Error types shared across the bridge.
//!
//! Validation errors (`InvalidTarget`, `InvalidRoom`, `AlreadySubscribed`,
//! `NotSubscribed`) are returned to the command caller. Connection and
//! delivery errors stay inside the listener and dispatcher tasks, where they
//! are logged and, for a rejected topic, reported to the affected rooms.

use thiserror::Error;

use crate::bridge::topic::TopicKey;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid topic `{0}`, expected <server>/<topic>")]
    InvalidTarget(String),

    #[error("invalid room id `{0}`")]
    InvalidRoom(String),

    #[error("this room is already subscribed to {0}")]
    AlreadySubscribed(TopicKey),

    #[error("this room is not subscribed to {0}")]
    NotSubscribed(TopicKey),

    /// Transient; the listener retries with backoff.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Fatal; the topic is dropped and its rooms are told why.
    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("delivery to room {room} failed: {reason}")]
    DeliveryFailed { room: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BridgeError {
    /// Whether the listener should keep retrying after this error. Anything
    /// else from a topic source ends the listener as a rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::ConnectionFailed(_))
    }
}
