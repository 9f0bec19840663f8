//! Subscription store backed by `sled`
//!
//! Three trees are kept in step:
//! - `subscriptions`: `server \0 topic \0 room` -> `SubscriptionRecord`
//! - `rooms`: `room \0 server \0 topic` -> `TopicKey` (reverse index)
//! - `topics`: `server \0 topic \0` -> `TopicRecord` (resume position)
//!
//! `server` includes the key's explicit `http://`/`https://`, if it has one.
//!
//! A topic record exists exactly as long as the topic has at least one
//! subscription. Callers serialize mutations per topic key; the store itself
//! only guarantees that each mutation is atomic across the three trees.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::{debug, warn};

use crate::bridge::topic::{Scheme, TopicKey};
use crate::utils::{BridgeError, Result};

const SEP: char = '\0';

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub key: TopicKey,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TopicRecord {
    pub key: TopicKey,
    pub last_event_id: Option<String>,
    pub last_event_time: Option<i64>,
}

#[derive(Clone)]
pub struct SubscriptionStore {
    db: Db,
    subscriptions: Tree,
    rooms: Tree,
    topics: Tree,
}

impl SubscriptionStore {
    /// Open or create the database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let subscriptions = db.open_tree("subscriptions")?;
        let rooms = db.open_tree("rooms")?;
        let topics = db.open_tree("topics")?;
        Ok(Self {
            db,
            subscriptions,
            rooms,
            topics,
        })
    }

    /// Subscribe `room_id` to `key`. Returns `true` when this is the first
    /// room on the topic, meaning a connection has to be opened.
    pub fn add(&self, key: &TopicKey, room_id: &str) -> Result<bool> {
        let sub_key = subscription_key(key, room_id);
        if self.subscriptions.contains_key(&sub_key)? {
            return Err(BridgeError::AlreadySubscribed(key.clone()));
        }

        let first = self.is_unsubscribed(key)?;
        let record = serde_json::to_vec(&SubscriptionRecord {
            key: key.clone(),
            room_id: room_id.to_string(),
            created_at: Utc::now(),
        })?;
        let index_value = serde_json::to_vec(key)?;
        let topic_value = serde_json::to_vec(&TopicRecord {
            key: key.clone(),
            last_event_id: None,
            last_event_time: None,
        })?;
        let index_key = room_key(room_id, key);
        let topic_key = topic_prefix(key);

        let outcome = (&self.subscriptions, &self.rooms, &self.topics).transaction(
            |(subscriptions, rooms, topics)| {
                subscriptions.insert(sub_key.as_slice(), record.as_slice())?;
                rooms.insert(index_key.as_slice(), index_value.as_slice())?;
                if first {
                    topics.insert(topic_key.as_slice(), topic_value.as_slice())?;
                }
                Ok::<_, ConflictableTransactionError<()>>(())
            },
        );
        storage_result(outcome)?;
        self.db.flush()?;

        debug!(topic = %key, room_id, first, "stored subscription");
        Ok(first)
    }

    /// Unsubscribe `room_id` from `key`. Returns `true` when the topic has no
    /// rooms left, meaning its connection has to be closed.
    pub fn remove(&self, key: &TopicKey, room_id: &str) -> Result<bool> {
        let sub_key = subscription_key(key, room_id);
        if !self.subscriptions.contains_key(&sub_key)? {
            return Err(BridgeError::NotSubscribed(key.clone()));
        }

        let remaining = self.rooms_for(key)?.len().saturating_sub(1);
        let last = remaining == 0;
        let index_key = room_key(room_id, key);
        let topic_key = topic_prefix(key);

        let outcome = (&self.subscriptions, &self.rooms, &self.topics).transaction(
            |(subscriptions, rooms, topics)| {
                subscriptions.remove(sub_key.as_slice())?;
                rooms.remove(index_key.as_slice())?;
                if last {
                    topics.remove(topic_key.as_slice())?;
                }
                Ok::<_, ConflictableTransactionError<()>>(())
            },
        );
        storage_result(outcome)?;
        self.db.flush()?;

        debug!(topic = %key, room_id, last, "removed subscription");
        Ok(last)
    }

    /// Rooms currently subscribed to `key`.
    pub fn rooms_for(&self, key: &TopicKey) -> Result<BTreeSet<String>> {
        let mut rooms = BTreeSet::new();
        for entry in self.subscriptions.scan_prefix(topic_prefix(key)) {
            let (_, value) = entry?;
            let record: SubscriptionRecord = serde_json::from_slice(&value)?;
            rooms.insert(record.room_id);
        }
        Ok(rooms)
    }

    /// Topics `room_id` is subscribed to.
    pub fn topics_for(&self, room_id: &str) -> Result<BTreeSet<TopicKey>> {
        let mut prefix = room_id.as_bytes().to_vec();
        prefix.push(SEP as u8);

        let mut keys = BTreeSet::new();
        for entry in self.rooms.scan_prefix(prefix) {
            let (_, value) = entry?;
            keys.insert(serde_json::from_slice(&value)?);
        }
        Ok(keys)
    }

    /// Every topic with at least one subscriber.
    pub fn topics(&self) -> Result<Vec<TopicKey>> {
        self.topics
            .iter()
            .map(|entry| -> Result<TopicKey> {
                let (_, value) = entry?;
                let record: TopicRecord = serde_json::from_slice(&value)?;
                Ok(record.key)
            })
            .collect()
    }

    /// Drop every subscription of `key` and return the rooms that held one.
    pub fn remove_topic(&self, key: &TopicKey) -> Result<BTreeSet<String>> {
        let rooms = self.rooms_for(key)?;
        let sub_keys: Vec<Vec<u8>> = rooms.iter().map(|r| subscription_key(key, r)).collect();
        let index_keys: Vec<Vec<u8>> = rooms.iter().map(|r| room_key(r, key)).collect();
        let topic_key = topic_prefix(key);

        let outcome = (&self.subscriptions, &self.rooms, &self.topics).transaction(
            |(subscriptions, rooms, topics)| {
                for sub_key in &sub_keys {
                    subscriptions.remove(sub_key.as_slice())?;
                }
                for index_key in &index_keys {
                    rooms.remove(index_key.as_slice())?;
                }
                topics.remove(topic_key.as_slice())?;
                Ok::<_, ConflictableTransactionError<()>>(())
            },
        );
        storage_result(outcome)?;
        self.db.flush()?;

        debug!(topic = %key, rooms = rooms.len(), "removed topic");
        Ok(rooms)
    }

    /// Drop every subscription of `room_id`. Returns the topics that lost
    /// their last subscriber.
    pub fn remove_room(&self, room_id: &str) -> Result<Vec<TopicKey>> {
        let topics = self.topics_for(room_id)?;
        self.remove_subscriptions(room_id, &topics)
    }

    /// Drop the subscriptions of `room_id` to each of `keys` and leave its
    /// other subscriptions alone. Returns the topics that lost their last
    /// subscriber.
    pub fn remove_subscriptions(
        &self,
        room_id: &str,
        keys: &BTreeSet<TopicKey>,
    ) -> Result<Vec<TopicKey>> {
        let mut emptied = Vec::new();
        for key in keys {
            match self.remove(key, room_id) {
                Ok(true) => emptied.push(key.clone()),
                Ok(false) => {}
                // raced with an unsubscribe; nothing left to do for this key
                Err(BridgeError::NotSubscribed(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(emptied)
    }

    /// Id of the last relayed message on `key`, if any.
    pub fn last_event_id(&self, key: &TopicKey) -> Result<Option<String>> {
        match self.topics.get(topic_prefix(key))? {
            Some(value) => {
                let record: TopicRecord = serde_json::from_slice(&value)?;
                Ok(record.last_event_id)
            }
            None => Ok(None),
        }
    }

    /// Remember the last relayed message of `key`.
    ///
    /// No-op when the topic has no subscribers any more, so a late event never
    /// resurrects a removed topic record. Not flushed: losing the position on
    /// a crash only means a few messages are relayed again.
    pub fn record_event(&self, key: &TopicKey, event_id: &str, time: i64) -> Result<()> {
        self.topics.fetch_and_update(topic_prefix(key), |old| {
            let old = old?;
            match serde_json::from_slice::<TopicRecord>(old) {
                Ok(mut record) => {
                    record.last_event_id = Some(event_id.to_string());
                    record.last_event_time = Some(time);
                    serde_json::to_vec(&record).ok().or_else(|| Some(old.to_vec()))
                }
                Err(e) => {
                    warn!(topic = %key, error = %e, "unreadable topic record left untouched");
                    Some(old.to_vec())
                }
            }
        })?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn corrupt_subscription(&self, key: &TopicKey, room_id: &str) -> Result<()> {
        self.subscriptions
            .insert(subscription_key(key, room_id), b"not json".as_slice())?;
        Ok(())
    }

    fn is_unsubscribed(&self, key: &TopicKey) -> Result<bool> {
        Ok(self
            .subscriptions
            .scan_prefix(topic_prefix(key))
            .next()
            .transpose()?
            .is_none())
    }
}

fn topic_prefix(key: &TopicKey) -> Vec<u8> {
    format!("{}{SEP}{}{SEP}", server_part(key), key.topic()).into_bytes()
}

fn subscription_key(key: &TopicKey, room_id: &str) -> Vec<u8> {
    let mut bytes = topic_prefix(key);
    bytes.extend_from_slice(room_id.as_bytes());
    bytes
}

fn room_key(room_id: &str, key: &TopicKey) -> Vec<u8> {
    format!("{room_id}{SEP}{}{SEP}{}", server_part(key), key.topic()).into_bytes()
}

/// Server with its explicit scheme, so `http://host/t` and `host/t` stay apart.
fn server_part(key: &TopicKey) -> String {
    let scheme = key.scheme().map_or("", Scheme::prefix);
    format!("{scheme}{}", key.server())
}

fn storage_result<T>(outcome: std::result::Result<T, TransactionError<()>>) -> Result<T> {
    outcome.map_err(|e| match e {
        TransactionError::Storage(e) => BridgeError::Storage(e),
        // the transactions above never abort
        TransactionError::Abort(()) => BridgeError::Storage(sled::Error::Unsupported(
            "subscription transaction aborted".to_string(),
        )),
    })
}

impl std::fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("db", &"sled::Db")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
