//! Remote document store boundary
//!
//! The core talks to the shared document store only through [`RemoteStore`]:
//! merge writes, idempotent deletes, atomic multi-document patches and
//! full-snapshot subscriptions. Every call may fail with a transport error.
//!
//! Subscriptions are explicit channels. [`RemoteStore::subscribe`] hands back a
//! [`Subscription`] whose receiver yields the whole collection on every change,
//! starting with the state at subscription time, together with a
//! [`SubscriptionToken`] that stops delivery when cancelled.

mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};

/// Document fields as stored remotely
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The three collections mirrored by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Students,
    Sessions,
    Rooms,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Students, Collection::Sessions, Collection::Rooms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Sessions => "sessions",
            Collection::Rooms => "rooms",
        }
    }

    /// Field that carries the document key inside the document body
    pub fn key_field(&self) -> &'static str {
        match self {
            Collection::Students => "nis",
            Collection::Sessions | Collection::Rooms => "id",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Full current contents of one collection
pub type Snapshot = Vec<Document>;

/// Cancellation handle shared between a subscriber and the store
#[derive(Debug, Clone, Default)]
pub struct SubscriptionToken {
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually cancelled
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct Subscription {
    pub collection: Collection,
    pub snapshots: mpsc::UnboundedReceiver<Snapshot>,
    pub token: SubscriptionToken,
}

impl Subscription {
    /// Stops delivery. Snapshots already queued are discarded.
    pub fn unsubscribe(&mut self) {
        self.token.cancel();
        self.snapshots.close();
    }

    /// Next snapshot, or `None` once the subscription is cancelled or the store hung up.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.token.is_cancelled() {
            return None;
        }
        let snapshot = self.snapshots.recv().await?;
        if self.token.is_cancelled() {
            return None;
        }
        Some(snapshot)
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Opens a live subscription. The current state is delivered immediately.
    async fn subscribe(&self, collection: Collection) -> Result<Subscription>;

    /// Create-or-update. Fields not present in `fields` are preserved.
    async fn set_merge(&self, collection: Collection, id: &str, fields: Fields) -> Result<()>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Applies every patch or none of them.
    async fn batch_update(&self, collection: Collection, entries: Vec<(String, Fields)>)
        -> Result<()>;
}

/// Serializes a payload into document fields, rejecting non-object payloads.
pub fn to_fields<T: Serialize>(payload: &T) -> Result<Fields> {
    match serde_json::to_value(payload)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SyncError::InvalidPayload(other.to_string())),
    }
}
