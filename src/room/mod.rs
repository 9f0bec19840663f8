//! The `room` module is the bridge's side of the chat client.
//!
//! The dispatcher only knows the `RoomSender` trait. Two implementations
//! ship with the crate: `ChannelRooms`, which hands messages to per-room
//! channels for an embedding chat client, and `ConsoleRooms`, which prints
//! them for the command-line driver.

pub mod channel;
pub mod console;
pub mod sender;

pub use channel::ChannelRooms;
pub use console::ConsoleRooms;
pub use sender::RoomSender;
