//! The `dispatch` module turns topic events into room messages.
//!
//! `Dispatcher` resolves the rooms subscribed to a topic and sends each of
//! them the rendered event; `render` holds the message layout.

pub mod dispatcher;
pub mod emoji;
pub mod render;

pub use dispatcher::{DeliveryReport, Dispatcher};
