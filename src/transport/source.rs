use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::bridge::topic::TopicKey;
use crate::transport::message::NtfyEvent;
use crate::utils::Result;

/// Live events of one topic, in the order the server emitted them. The
/// stream ends when the server closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<NtfyEvent>> + Send>>;

/// Opens event streams for topics.
///
/// `open` fails with `ConnectionFailed` for anything worth retrying and with
/// `ConnectionRejected` when the server refuses the topic for good.
#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn open(&self, key: &TopicKey, since: Option<&str>) -> Result<EventStream>;
}
