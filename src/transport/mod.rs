//! The `transport` module is the wire side of the topic listeners.
//!
//! It defines the ntfy event format, the `TopicSource` seam the listeners
//! open streams through, and the WebSocket implementation that talks to a
//! real ntfy server.

pub mod message;
pub mod source;
pub mod websocket;

pub use message::{Attachment, EventKind, NtfyEvent};
pub use source::{EventStream, TopicSource};
pub use websocket::WebSocketSource;
