use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{Collection, Document, Fields, RemoteStore, Snapshot, Subscription, SubscriptionToken};
use crate::error::{Result, SyncError};

type CollectionData = BTreeMap<String, Fields>;

struct Listener {
    sender: mpsc::UnboundedSender<Snapshot>,
    token: SubscriptionToken,
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<Collection, CollectionData>,
    listeners: HashMap<Collection, Vec<Listener>>,
}

impl Inner {
    fn snapshot(&self, collection: Collection) -> Snapshot {
        self.data
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pushes the current collection state to every live listener, pruning dead ones
    fn broadcast(&mut self, collection: Collection) {
        let snapshot = self.snapshot(collection);
        if let Some(listeners) = self.listeners.get_mut(&collection) {
            listeners.retain(|listener| {
                !listener.token.is_cancelled() && listener.sender.send(snapshot.clone()).is_ok()
            });
        }
    }
}

/// In-process document store with the same guarantees as the hosted one
///
/// Documents are JSON objects kept per collection in key order. Writes notify
/// every subscriber of the touched collection with a full snapshot. Setting
/// the store offline makes every write fail with a transport error, which is
/// how partitions are simulated.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads documents from a JSON file written by [`MemoryStore::save`].
    /// A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Store file not found, starting empty");
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let data: BTreeMap<Collection, CollectionData> = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&raw)?
        };

        let count: usize = data.values().map(|docs| docs.len()).sum();
        tracing::info!(path = %path.display(), documents = count, "Loaded store file");

        Ok(Self {
            inner: Mutex::new(Inner {
                data,
                listeners: HashMap::new(),
            }),
            ..Default::default()
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let inner = self.inner.lock().await;
            serde_json::to_string_pretty(&inner.data)?
        };
        tokio::fs::write(path, json).await?;
        tracing::debug!(path = %path.display(), "Store file written");
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::info!(offline, "Memory store connectivity changed");
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of write calls that reached the store, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn documents(&self, collection: Collection) -> Snapshot {
        self.inner.lock().await.snapshot(collection)
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Option<Fields> {
        let inner = self.inner.lock().await;
        inner.data.get(&collection).and_then(|docs| docs.get(id)).cloned()
    }

    pub async fn subscriber_count(&self, collection: Collection) -> usize {
        let inner = self.inner.lock().await;
        inner
            .listeners
            .get(&collection)
            .map(|listeners| listeners.iter().filter(|l| !l.token.is_cancelled()).count())
            .unwrap_or(0)
    }

    fn begin_write(&self, collection: Collection, op: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.is_offline() {
            tracing::warn!(collection = %collection, op, "Write rejected, store offline");
            return Err(SyncError::store(format!("{} on {} while offline", op, collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        let (sender, snapshots) = mpsc::unbounded_channel();
        let token = SubscriptionToken::new();

        let mut inner = self.inner.lock().await;
        sender
            .send(inner.snapshot(collection))
            .map_err(|_| SyncError::SubscriptionClosed(collection.to_string()))?;
        inner.listeners.entry(collection).or_default().push(Listener {
            sender,
            token: token.clone(),
        });

        tracing::debug!(collection = %collection, "Subscription opened");
        Ok(Subscription {
            collection,
            snapshots,
            token,
        })
    }

    async fn set_merge(&self, collection: Collection, id: &str, fields: Fields) -> Result<()> {
        self.begin_write(collection, "set_merge")?;

        let mut inner = self.inner.lock().await;
        let doc = inner
            .data
            .entry(collection)
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (key, value) in fields {
            doc.insert(key, value);
        }
        inner.broadcast(collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.begin_write(collection, "delete")?;

        let mut inner = self.inner.lock().await;
        let removed = inner
            .data
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            inner.broadcast(collection);
        }
        Ok(())
    }

    async fn batch_update(
        &self,
        collection: Collection,
        entries: Vec<(String, Fields)>,
    ) -> Result<()> {
        self.begin_write(collection, "batch_update")?;
        if entries.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let docs = inner.data.entry(collection).or_default();

        // update semantics: every target must already exist, checked before anything is applied
        if let Some((missing, _)) = entries.iter().find(|(id, _)| !docs.contains_key(id)) {
            return Err(SyncError::not_found(collection.as_str(), missing.clone()));
        }

        for (id, patch) in entries {
            if let Some(doc) = docs.get_mut(&id) {
                for (key, value) in patch {
                    doc.insert(key, value);
                }
            }
        }
        inner.broadcast(collection);
        Ok(())
    }
}
