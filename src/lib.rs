//! # ntfy-bridge
//!
//! `ntfy-bridge` relays messages published on ntfy topics into chat rooms.
//! A room subscribes to `<server>/<topic>`; from then on every message on that
//! topic shows up in the room. Rooms sharing a topic share one connection to
//! the ntfy server.
//!
//! ## Core Modules
//!
//! - `bridge`: subscribe/unsubscribe commands and the lifecycle of topic connections.
//! - `config`: layered configuration from defaults, a config file and the environment.
//! - `dispatch`: renders events and fans them out to the subscribed rooms.
//! - `listener`: one reconnecting listener task per subscribed topic.
//! - `persistence`: the durable subscription store, backed by `sled`.
//! - `room`: the interface to the chat side and the shipped room implementations.
//! - `transport`: ntfy events and the WebSocket topic source.
//! - `utils`: shared error type and logging setup.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod listener;
pub mod persistence;
pub mod room;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
