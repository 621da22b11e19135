// Integration tests for the sync core
// These drive the mirror, dispatcher, session machine and importer together against the in-process store

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};

use examsy_sync::config::ImportConfig;
use examsy_sync::import;
use examsy_sync::mirror::Mapping;
use examsy_sync::model::{Room, Student, StudentPatch, StudentStatus};
use examsy_sync::session::{
    spawn_room_watch, Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
use examsy_sync::store::{Fields, Subscription};
use examsy_sync::{
    Collection, Command, Dispatcher, LiveMirror, MemoryStore, RemoteStore, Result, SessionMachine,
    SessionState, SyncError,
};

const WAIT: Duration = Duration::from_secs(2);

/// Store that rejects writes to chosen document ids
struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<String>,
}

impl FlakyStore {
    fn new(failing: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.failing.contains(id) {
            return Err(SyncError::store(format!("injected failure for {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        self.inner.subscribe(collection).await
    }

    async fn set_merge(&self, collection: Collection, id: &str, fields: Fields) -> Result<()> {
        self.check(id)?;
        self.inner.set_merge(collection, id, fields).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check(id)?;
        self.inner.delete(collection, id).await
    }

    async fn batch_update(&self, collection: Collection, entries: Vec<(String, Fields)>) -> Result<()> {
        for (id, _) in &entries {
            self.check(id)?;
        }
        self.inner.batch_update(collection, entries).await
    }
}

async fn start() -> (Arc<MemoryStore>, Arc<LiveMirror>, Dispatcher) {
    let store = Arc::new(MemoryStore::new());
    let mirror = LiveMirror::start(store.clone()).await.expect("mirror starts");
    timeout(WAIT, mirror.wait_all()).await.expect("initial snapshots");
    let dispatcher = Dispatcher::new(store.clone());
    (store, mirror, dispatcher)
}

async fn wait_students<F>(mirror: &LiveMirror, predicate: F) -> Arc<Mapping<Student>>
where
    F: Fn(&Mapping<Student>) -> bool,
{
    let mut rx = mirror.watch_students();
    let result = timeout(WAIT, rx.wait_for(|m| predicate(m.as_ref()))).await;
    let students = result.expect("student snapshot in time").expect("mirror alive");
    students.clone()
}

fn room(id: &str, name: &str) -> Room {
    let mut room = Room::new(id, name);
    room.username = format!("proktor-{}", id);
    room.password = "secret".to_string();
    room
}

/// Test the documented end-to-end flow
/// Empty mirrors, load signal, one add, one document in the next snapshot
#[tokio::test]
async fn test_add_student_end_to_end() {
    let (_store, mirror, dispatcher) = start().await;
    assert!(mirror.is_loaded());
    assert!(mirror.students().is_empty());

    let mut student = Student::new("001", "A");
    student.status = StudentStatus::NotStarted;
    assert!(dispatcher.dispatch(Command::AddStudent(student.clone())).await);

    let students = wait_students(&mirror, |m| !m.is_empty()).await;
    assert_eq!(students.len(), 1);
    assert_eq!(students["001"], student);

    mirror.shutdown();
}

/// Test that every snapshot fully replaces the mapping
#[tokio::test]
async fn test_mirror_tracks_deletes_as_full_replacement() {
    let (_store, mirror, dispatcher) = start().await;

    for nis in ["001", "002", "003"] {
        assert!(dispatcher.dispatch(Command::AddStudent(Student::new(nis, nis))).await);
    }
    wait_students(&mirror, |m| m.len() == 3).await;

    assert!(dispatcher.dispatch(Command::DeleteStudent { nis: "002".to_string() }).await);
    let students = wait_students(&mirror, |m| m.len() == 2).await;
    assert_eq!(students.keys().collect::<Vec<_>>(), vec!["001", "003"]);

    mirror.shutdown();
}

/// Test merge semantics as seen through the mirror
#[tokio::test]
async fn test_update_preserves_fields_in_mirror() {
    let (_store, mirror, dispatcher) = start().await;

    let mut student = Student::new("001", "A");
    student.class = "9".to_string();
    student.password = "pw".to_string();
    assert!(dispatcher.dispatch(Command::AddStudent(student)).await);

    let ok = dispatcher
        .dispatch(Command::UpdateStudent {
            nis: "001".to_string(),
            patch: StudentPatch::status(StudentStatus::Blocked),
        })
        .await;
    assert!(ok);

    let students = wait_students(&mirror, |m| {
        m.get("001").map(|s| s.status == StudentStatus::Blocked).unwrap_or(false)
    })
    .await;
    assert_eq!(students["001"].class, "9");
    assert_eq!(students["001"].password, "pw");

    mirror.shutdown();
}

/// Test that a bulk update under a transport failure changes no student
#[tokio::test]
async fn test_bulk_update_all_or_nothing() {
    let (store, mirror, dispatcher) = start().await;
    let ids: Vec<String> = ["001", "002", "003"].iter().map(|s| s.to_string()).collect();
    for nis in &ids {
        assert!(dispatcher.dispatch(Command::AddStudent(Student::new(nis.clone(), "X"))).await);
    }
    wait_students(&mirror, |m| m.len() == 3).await;

    store.set_offline(true);
    let ok = dispatcher
        .dispatch(Command::BulkUpdateStudents {
            selected_ids: ids.clone(),
            updates: StudentPatch::status(StudentStatus::Finished),
        })
        .await;
    assert!(!ok);
    assert!(!dispatcher.is_processing());
    assert!(mirror
        .students()
        .values()
        .all(|s| s.status == StudentStatus::NotStarted));

    store.set_offline(false);
    let ok = dispatcher
        .dispatch(Command::BulkUpdateStudents {
            selected_ids: ids,
            updates: StudentPatch::status(StudentStatus::Finished),
        })
        .await;
    assert!(ok);
    wait_students(&mirror, |m| m.values().all(|s| s.status == StudentStatus::Finished)).await;

    mirror.shutdown();
}

/// Test that malformed rows are skipped rather than failed
#[tokio::test]
async fn test_import_skips_malformed_rows_without_dispatch() {
    let (store, mirror, dispatcher) = start().await;
    assert!(dispatcher.dispatch(Command::AddRoom(room("R1", "RUANG 01"))).await);
    let writes_before = store.write_count();

    let mut rooms = mirror.watch_rooms();
    let rooms = timeout(WAIT, rooms.wait_for(|r| r.contains_key("R1")))
        .await
        .unwrap()
        .unwrap()
        .clone();

    let csv = "NIS,NAMA,KELAS,RUANG,PASSWORD,STATUS\n\
               001,ahmad,7,ruang 01,,IN_PROGRESS\n\
               ,,8,RUANG 01,x,FINISHED\n\
               002,siti,8,,pw,\n\
               003,budi,9,GUDANG,pw,bogus\n";

    let report = import::run(&dispatcher, csv, &rooms, &ImportConfig::default()).await;
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(store.write_count() - writes_before, 3);

    let students = wait_students(&mirror, |m| m.len() == 3).await;
    assert_eq!(students["001"].name, "AHMAD");
    assert_eq!(students["001"].room(), Some("R1"));
    assert_eq!(students["001"].status, StudentStatus::InProgress);
    assert_eq!(students["001"].password, "password123");
    assert_eq!(students["002"].status, StudentStatus::NotStarted);
    assert_eq!(students["003"].room(), None);
    assert_eq!(students["003"].status, StudentStatus::NotStarted);

    mirror.shutdown();
}

/// Test that one failing row does not stop the rest of the import
#[tokio::test]
async fn test_import_continues_after_failure() {
    let store = Arc::new(FlakyStore::new(&["002"]));
    let dispatcher = Dispatcher::new(store.clone());

    let csv = "h\n001,A\n002,B\n003,C";
    let report = import::run(&dispatcher, csv, &Mapping::new(), &ImportConfig::default()).await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_nis, vec!["002".to_string()]);
    assert_eq!(store.inner.documents(Collection::Students).await.len(), 2);
}

/// Test that a failed status write keeps the student out of the exam
#[tokio::test]
async fn test_student_login_requires_successful_dispatch() {
    let (store, mirror, dispatcher) = start().await;
    let student = Student::new("001", "A");
    let session = examsy_sync::model::ExamSession::new("S1", "Math");
    assert!(dispatcher.dispatch(Command::AddStudent(student.clone())).await);

    let mut machine = SessionMachine::new(Box::new(MemoryCredentialStore::new()));

    store.set_offline(true);
    assert!(!machine.login_student(&dispatcher, &student, &session).await.unwrap());
    assert_eq!(machine.state(), &SessionState::Anonymous);

    store.set_offline(false);
    assert!(machine.login_student(&dispatcher, &student, &session).await.unwrap());
    let students = wait_students(&mirror, |m| {
        m.get("001").map(|s| s.status == StudentStatus::InProgress).unwrap_or(false)
    })
    .await;
    assert_eq!(students["001"].name, "A");

    let mut violating = StudentPatch::default();
    violating.violations = Some(2);
    assert!(
        dispatcher
            .dispatch(Command::UpdateStudent { nis: "001".to_string(), patch: violating })
            .await
    );

    assert!(machine.finish_exam(&dispatcher).await.unwrap());
    assert_eq!(machine.state(), &SessionState::Anonymous);
    let students = wait_students(&mirror, |m| {
        m.get("001").map(|s| s.status == StudentStatus::Finished).unwrap_or(false)
    })
    .await;
    assert_eq!(students["001"].violations, 0);

    mirror.shutdown();
}

/// Test that a persisted proctor session degrades when its room is deleted
#[tokio::test]
async fn test_proctor_credential_self_heals_on_room_delete() {
    let dir = tempfile::tempdir().unwrap();
    let credential_path = dir.path().join("auth.json");
    let credentials = FileCredentialStore::new(&credential_path);
    credentials
        .save(&Credential::Proctor {
            room_id: "R1".to_string(),
        })
        .unwrap();

    let (_store, mirror, dispatcher) = start().await;
    assert!(dispatcher.dispatch(Command::AddRoom(room("R1", "RUANG 01"))).await);
    assert!(dispatcher.dispatch(Command::AddRoom(room("R2", "RUANG 02"))).await);
    let mut rooms = mirror.watch_rooms();
    timeout(WAIT, rooms.wait_for(|r| r.len() == 2)).await.unwrap().unwrap();

    let machine = Arc::new(Mutex::new(SessionMachine::new(Box::new(
        FileCredentialStore::new(&credential_path),
    ))));
    let watcher = spawn_room_watch(machine.clone(), mirror.clone());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        machine.lock().await.state(),
        &SessionState::Proctor {
            room_id: "R1".to_string()
        }
    );

    assert!(dispatcher.dispatch(Command::DeleteRoom { id: "R1".to_string() }).await);

    timeout(WAIT, async {
        loop {
            if *machine.lock().await.state() == SessionState::Anonymous {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session self-heals");

    assert_eq!(credentials.load().unwrap(), None);

    mirror.shutdown();
    watcher.abort();
}

/// Test that teardown stops notifications and is idempotent
#[tokio::test]
async fn test_no_updates_after_shutdown() {
    let (store, mirror, dispatcher) = start().await;
    assert!(dispatcher.dispatch(Command::AddStudent(Student::new("001", "A"))).await);
    wait_students(&mirror, |m| m.len() == 1).await;

    mirror.shutdown();
    mirror.shutdown();

    // writes still land remotely, the mirror just stops following them
    assert!(dispatcher.dispatch(Command::AddStudent(Student::new("002", "B"))).await);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(mirror.students().len(), 1);
    assert_eq!(store.documents(Collection::Students).await.len(), 2);
    assert_eq!(store.subscriber_count(Collection::Students).await, 0);
}

/// Test that the three collections are mirrored independently
#[tokio::test]
async fn test_collections_are_independent() {
    let (_store, mirror, dispatcher) = start().await;

    assert!(dispatcher.dispatch(Command::AddRoom(room("R1", "RUANG 01"))).await);
    let mut rooms = mirror.watch_rooms();
    timeout(WAIT, rooms.wait_for(|r| r.len() == 1)).await.unwrap().unwrap();

    assert!(mirror.students().is_empty());
    assert!(mirror.sessions().is_empty());

    mirror.shutdown();
}

#[tokio::test]
async fn test_mirror_keeps_every_stored_document() {
    let (store, mirror, _dispatcher) = start().await;

    let raw = [
        (Collection::Rooms, "R1", serde_json::json!({"id": "R1", "name": "RUANG 01", "capacity": "30"})),
        (Collection::Students, "123001", serde_json::json!({"nis": 123001, "name": "AHMAD"})),
        (Collection::Students, "123002", serde_json::json!({"name": "SITI", "status": "BELUM_MASUK"})),
    ];
    for (collection, id, value) in raw {
        let fields = value.as_object().cloned().expect("object literal");
        store.set_merge(collection, id, fields).await.unwrap();
    }

    let students = wait_students(&mirror, |m| m.len() == 2).await;
    assert_eq!(students["123001"].nis, "123001");
    assert_eq!(students["123002"].status, StudentStatus::NotStarted);

    let mut rx = mirror.watch_rooms();
    let rooms = timeout(WAIT, rx.wait_for(|m| m.len() == 1))
        .await
        .expect("room snapshot")
        .unwrap()
        .clone();
    assert_eq!(rooms["R1"].capacity, 30);
    assert_eq!(store.documents(Collection::Rooms).await.len(), rooms.len());
    assert_eq!(store.documents(Collection::Students).await.len(), students.len());
}
