use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::mirror::LiveMirror;
use crate::session::{spawn_room_watch, FileCredentialStore, SessionMachine};
use crate::store::MemoryStore;

/// Wires store, mirror, dispatcher and session machine together
pub struct ExamsyCore {
    pub store: Arc<MemoryStore>,
    pub mirror: Arc<LiveMirror>,
    pub dispatcher: Dispatcher,
    pub session: Arc<Mutex<SessionMachine>>,
    room_watch: JoinHandle<()>,
}

impl ExamsyCore {
    /// Loads the store file, starts mirroring and restores the persisted session
    pub async fn start(config: &Config) -> Result<Self> {
        let store = Arc::new(MemoryStore::load(&config.storage.store_file)?);
        Self::with_store(store, config).await
    }

    pub async fn with_store(store: Arc<MemoryStore>, config: &Config) -> Result<Self> {
        let mirror = LiveMirror::start(store.clone()).await?;
        let dispatcher = Dispatcher::new(store.clone());

        let credentials = FileCredentialStore::new(config.storage.credential_file.clone());
        let session = Arc::new(Mutex::new(SessionMachine::new(Box::new(credentials))));
        let room_watch = spawn_room_watch(session.clone(), mirror.clone());

        Ok(Self {
            store,
            mirror,
            dispatcher,
            session,
            room_watch,
        })
    }

    /// Writes the store back to its file
    pub async fn persist(&self, config: &Config) -> Result<()> {
        self.store.save(&config.storage.store_file).await
    }

    pub fn shutdown(&self) {
        self.mirror.shutdown();
        self.room_watch.abort();
    }
}
