//! Snapshot of lock state carried by an event.
//!
//! The event core never interprets these fields; they are stored and
//! serialized as given. Fields this crate does not know about are kept in
//! `extra` so a snapshot written by a newer lock client survives a round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockInformation {
    /// Owner currently holding the lock.
    #[serde(default)]
    pub owner_id: String,

    /// Version of the lock row, bumped on every write.
    #[serde(default)]
    pub version: u64,

    /// Reentrant hold count.
    #[serde(default)]
    pub lock_count: u32,

    /// When the current owner first acquired the lock.
    #[serde(default)]
    pub lock_begin_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LockInformation {
    pub fn new(owner_id: impl Into<String>, version: u64) -> Self {
        Self {
            owner_id: owner_id.into(),
            version,
            ..Self::default()
        }
    }
}
