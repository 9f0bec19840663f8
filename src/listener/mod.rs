//! Topic listeners
//!
//! One task per subscribed topic keeps a live event stream open, reconnecting
//! with capped exponential backoff, and hands every relayed event to an
//! `EventSink` in the order it arrived. A rejected topic ends its task and is
//! reported to the sink once.

pub mod backoff;
pub mod connection;
pub mod pool;
pub mod state;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bridge::topic::TopicKey;
use crate::transport::NtfyEvent;

pub use backoff::Backoff;
pub use connection::{ConnectionInfo, TopicConnection};
pub use pool::ListenerPool;
pub use state::ConnectionState;

/// Receives what the listeners produce.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A `message` event arrived on `key`. The next event of the same
    /// connection is not handed over before this returns.
    async fn event(&self, key: &TopicKey, event: NtfyEvent);

    /// The server refused `key`; connection `connection_id` has closed for good.
    async fn rejected(&self, key: &TopicKey, connection_id: Uuid, reason: String);
}

#[cfg(test)]
mod tests;
