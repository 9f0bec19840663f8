//! The `bridge` module ties the pieces together.
//!
//! `Bridge` is the command entry point: it validates targets, updates the
//! subscription store and starts or stops topic listeners so that each
//! subscribed topic has exactly one live connection. Listener output flows
//! back through `Relay` into the dispatcher.

pub mod command;
pub mod engine;
mod locks;
pub mod topic;

pub use command::{Command, execute};
pub use engine::{Bridge, Subscribed, Unsubscribed};
pub use topic::{Scheme, TopicKey};
