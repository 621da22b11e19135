//! Live mirror of the remote collections
//!
//! One subscription per collection feeds a pump task that decodes each full
//! snapshot and replaces the local mapping wholesale. Observers read the
//! mappings through `watch` receivers. The three streams are independent; the
//! initial-load signal only waits for students.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::model::{ExamSession, Room, Student};
use crate::store::{Collection, RemoteStore, Snapshot, Subscription, SubscriptionToken};

/// Documents of one collection keyed by document id
pub type Mapping<T> = BTreeMap<String, T>;

/// Label shown for a student whose room id does not resolve
pub const UNRESOLVED_ROOM_LABEL: &str = "-";

/// Which collections have delivered at least one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Received {
    pub students: bool,
    pub sessions: bool,
    pub rooms: bool,
}

impl Received {
    pub fn get(&self, collection: Collection) -> bool {
        match collection {
            Collection::Students => self.students,
            Collection::Sessions => self.sessions,
            Collection::Rooms => self.rooms,
        }
    }

    fn mark(&mut self, collection: Collection) {
        match collection {
            Collection::Students => self.students = true,
            Collection::Sessions => self.sessions = true,
            Collection::Rooms => self.rooms = true,
        }
    }

    pub fn all(&self) -> bool {
        self.students && self.sessions && self.rooms
    }
}

pub struct LiveMirror {
    students: watch::Sender<Arc<Mapping<Student>>>,
    sessions: watch::Sender<Arc<Mapping<ExamSession>>>,
    rooms: watch::Sender<Arc<Mapping<Room>>>,
    received: watch::Sender<Received>,
    tokens: Vec<SubscriptionToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: watch::Sender<bool>,
}

impl LiveMirror {
    /// Opens the three subscriptions and starts mirroring
    ///
    /// If any subscription cannot be opened, the ones already opened are
    /// cancelled and the error is returned.
    pub async fn start(store: Arc<dyn RemoteStore>) -> Result<Arc<Self>> {
        let mut subscriptions = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            match store.subscribe(collection).await {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    tracing::error!(collection = %collection, error = %e, "Failed to open subscription");
                    for sub in subscriptions.iter_mut() {
                        sub.unsubscribe();
                    }
                    return Err(e);
                }
            }
        }

        let mirror = Arc::new(Self {
            students: watch::Sender::new(Arc::new(Mapping::new())),
            sessions: watch::Sender::new(Arc::new(Mapping::new())),
            rooms: watch::Sender::new(Arc::new(Mapping::new())),
            received: watch::Sender::new(Received::default()),
            tokens: subscriptions.iter().map(|s| s.token.clone()).collect(),
            tasks: Mutex::new(Vec::new()),
            stopped: watch::Sender::new(false),
        });

        let handles: Vec<JoinHandle<()>> = subscriptions
            .into_iter()
            .map(|sub| tokio::spawn(Self::pump(mirror.clone(), sub)))
            .collect();
        if let Ok(mut tasks) = mirror.tasks.lock() {
            tasks.extend(handles);
        }

        tracing::info!("Live mirror started");
        Ok(mirror)
    }

    async fn pump(mirror: Arc<Self>, mut sub: Subscription) {
        let collection = sub.collection;
        while let Some(snapshot) = sub.next().await {
            if mirror.is_stopped() {
                break;
            }
            mirror.apply(collection, snapshot);
        }
        tracing::debug!(collection = %collection, "Mirror pump finished");
    }

    /// Replaces the mapping for `collection` with the contents of `snapshot`
    pub(crate) fn apply(&self, collection: Collection, snapshot: Snapshot) {
        let count = snapshot.len();
        match collection {
            Collection::Students => {
                self.students.send_replace(Arc::new(decode_mapping(collection, snapshot)));
            }
            Collection::Sessions => {
                self.sessions.send_replace(Arc::new(decode_mapping(collection, snapshot)));
            }
            Collection::Rooms => {
                self.rooms.send_replace(Arc::new(decode_mapping(collection, snapshot)));
            }
        }

        self.received.send_if_modified(|received| {
            if received.get(collection) {
                return false;
            }
            received.mark(collection);
            if collection == Collection::Students {
                tracing::info!("Initial student load complete");
            }
            true
        });

        tracing::debug!(collection = %collection, count, "Snapshot applied");
    }

    /// Cancels all subscriptions. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.stopped.send_replace(true) {
            return;
        }
        for token in &self.tokens {
            token.cancel();
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        tracing::info!("Live mirror stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolves once [`LiveMirror::shutdown`] has been called
    pub async fn wait_stopped(&self) {
        let mut rx = self.stopped.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn students(&self) -> Arc<Mapping<Student>> {
        self.students.borrow().clone()
    }

    pub fn sessions(&self) -> Arc<Mapping<ExamSession>> {
        self.sessions.borrow().clone()
    }

    pub fn rooms(&self) -> Arc<Mapping<Room>> {
        self.rooms.borrow().clone()
    }

    pub fn watch_students(&self) -> watch::Receiver<Arc<Mapping<Student>>> {
        self.students.subscribe()
    }

    pub fn watch_sessions(&self) -> watch::Receiver<Arc<Mapping<ExamSession>>> {
        self.sessions.subscribe()
    }

    pub fn watch_rooms(&self) -> watch::Receiver<Arc<Mapping<Room>>> {
        self.rooms.subscribe()
    }

    pub fn has_received(&self, collection: Collection) -> bool {
        self.received.borrow().get(collection)
    }

    /// True once the first student snapshot has been applied
    pub fn is_loaded(&self) -> bool {
        self.has_received(Collection::Students)
    }

    /// Waits for the first student snapshot
    pub async fn wait_loaded(&self) {
        self.wait_received(Collection::Students).await
    }

    /// Waits for the first snapshot of `collection`. Once this resolves the
    /// mapping already holds that snapshot.
    pub async fn wait_received(&self, collection: Collection) {
        let mut rx = self.received.subscribe();
        let _ = rx.wait_for(|r| r.get(collection)).await;
    }

    /// Waits until every collection has delivered a snapshot
    pub async fn wait_all(&self) {
        let mut rx = self.received.subscribe();
        let _ = rx.wait_for(|r| r.all()).await;
    }

    /// Room name for display, falling back to [`UNRESOLVED_ROOM_LABEL`]
    pub fn room_label(&self, room_id: Option<&str>) -> String {
        room_id
            .and_then(|id| self.rooms.borrow().get(id).map(|r| r.name.clone()))
            .unwrap_or_else(|| UNRESOLVED_ROOM_LABEL.to_string())
    }

    pub fn students_in_room(&self, room_id: &str) -> Vec<Student> {
        self.students
            .borrow()
            .values()
            .filter(|s| s.room() == Some(room_id))
            .cloned()
            .collect()
    }

    /// Case-insensitive search on name or nis, optionally restricted to one room
    pub fn filter_students(&self, query: &str, room_id: Option<&str>) -> Vec<Student> {
        let needle = query.trim().to_lowercase();
        self.students
            .borrow()
            .values()
            .filter(|s| {
                needle.is_empty()
                    || s.name.to_lowercase().contains(&needle)
                    || s.nis.to_lowercase().contains(&needle)
            })
            .filter(|s| match room_id {
                Some(room) => s.room_id.as_deref().unwrap_or("").trim() == room.trim(),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Case-insensitive exact lookup of a room by name; blank names match nothing
pub fn find_room_by_name<'a>(rooms: &'a Mapping<Room>, name: &str) -> Option<&'a Room> {
    if name.trim().is_empty() {
        return None;
    }
    rooms.values().find(|r| r.name_matches(name))
}

fn decode_mapping<T: DeserializeOwned>(collection: Collection, snapshot: Snapshot) -> Mapping<T> {
    let mut mapping = Mapping::new();
    for doc in snapshot {
        let mut fields = doc.fields;
        fields
            .entry(collection.key_field())
            .or_insert_with(|| serde_json::Value::String(doc.id.clone()));

        match serde_json::from_value::<T>(serde_json::Value::Object(fields)) {
            Ok(value) => {
                mapping.insert(doc.id, value);
            }
            Err(e) => {
                let err = SyncError::DocumentDecode {
                    collection: collection.to_string(),
                    id: doc.id,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "Skipping undecodable document");
            }
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;
    use crate::store::{Document, Fields, MemoryStore};
    use serde_json::json;

    fn doc(id: &str, value: serde_json::Value) -> Document {
        let fields: Fields = match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        };
        Document {
            id: id.to_string(),
            fields,
        }
    }

    async fn started() -> (Arc<MemoryStore>, Arc<LiveMirror>) {
        let store = Arc::new(MemoryStore::new());
        let mirror = LiveMirror::start(store.clone()).await.unwrap();
        mirror.wait_all().await;
        (store, mirror)
    }

    #[tokio::test]
    async fn test_snapshot_replaces_mapping() {
        let (_store, mirror) = started().await;

        mirror.apply(
            Collection::Students,
            vec![doc("001", json!({"name": "A"})), doc("002", json!({"name": "B"}))],
        );
        assert_eq!(mirror.students().len(), 2);

        mirror.apply(Collection::Students, vec![doc("003", json!({"name": "C"}))]);
        let students = mirror.students();
        assert_eq!(students.keys().collect::<Vec<_>>(), vec!["003"]);
        assert_eq!(students["003"].nis, "003");
    }

    #[tokio::test]
    async fn test_empty_collection_counts_as_loaded() {
        let (_store, mirror) = started().await;
        assert!(mirror.is_loaded());
        assert!(mirror.students().is_empty());
        assert!(mirror.rooms().is_empty());
    }

    #[tokio::test]
    async fn test_loosely_typed_documents_are_kept() {
        let (_store, mirror) = started().await;
        mirror.apply(
            Collection::Rooms,
            vec![
                doc("R1", json!({"name": "A", "capacity": "30"})),
                doc("R2", json!({"capacity": "lots", "username": null})),
            ],
        );
        let rooms = mirror.rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms["R1"].capacity, 30);
        assert_eq!(rooms["R2"].capacity, 0);
        assert_eq!(rooms["R2"].id, "R2");

        mirror.apply(
            Collection::Students,
            vec![
                doc("123001", json!({"nis": 123001, "class": 7, "violations": "2"})),
                doc("123002", json!({"name": "SITI", "status": "BELUM_MASUK"})),
            ],
        );
        let students = mirror.students();
        assert_eq!(students.len(), 2);
        assert_eq!(students["123001"].nis, "123001");
        assert_eq!(students["123001"].class, "7");
        assert_eq!(students["123001"].violations, 2);
        assert_eq!(students["123002"].status, StudentStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_room_label_fallback() {
        let (_store, mirror) = started().await;
        mirror.apply(Collection::Rooms, vec![doc("R1", json!({"name": "RUANG 01"}))]);

        assert_eq!(mirror.room_label(Some("R1")), "RUANG 01");
        assert_eq!(mirror.room_label(Some("R9")), UNRESOLVED_ROOM_LABEL);
        assert_eq!(mirror.room_label(None), UNRESOLVED_ROOM_LABEL);
    }

    #[tokio::test]
    async fn test_filter_students() {
        let (_store, mirror) = started().await;
        mirror.apply(
            Collection::Students,
            vec![
                doc("123001", json!({"name": "AHMAD", "roomId": "R1"})),
                doc("123002", json!({"name": "SITI", "roomId": "R2"})),
                doc("123003", json!({"name": "BUDI"})),
            ],
        );

        assert_eq!(mirror.filter_students("", None).len(), 3);
        assert_eq!(mirror.filter_students("siti", None)[0].nis, "123002");
        assert_eq!(mirror.filter_students("1230", Some("R1")).len(), 1);
        assert_eq!(mirror.students_in_room("R2").len(), 1);
    }

    #[tokio::test]
    async fn test_find_room_by_name() {
        let (_store, mirror) = started().await;
        mirror.apply(Collection::Rooms, vec![doc("R1", json!({"name": "Ruang 01"}))]);

        let rooms = mirror.rooms();
        assert_eq!(find_room_by_name(&rooms, "RUANG 01").map(|r| r.id.as_str()), Some("R1"));
        assert!(find_room_by_name(&rooms, "").is_none());
        assert!(find_room_by_name(&rooms, "RUANG 02").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (store, mirror) = started().await;
        mirror.shutdown();
        mirror.shutdown();
        assert!(mirror.is_stopped());
        tokio::time::timeout(std::time::Duration::from_secs(1), mirror.wait_stopped())
            .await
            .unwrap();

        store
            .set_merge(Collection::Rooms, "R1", serde_json::Map::new())
            .await
            .unwrap();
        assert_eq!(store.subscriber_count(Collection::Rooms).await, 0);
    }
}
