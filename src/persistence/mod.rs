//! The `persistence` module stores the subscription table.
//!
//! Subscriptions must survive restarts so the bridge can reopen exactly the
//! connections it had before. The store is an embedded `sled` database; every
//! subscription change is written atomically and flushed before it returns.

pub mod sled_store;

pub use sled_store::{SubscriptionRecord, SubscriptionStore, TopicRecord};
