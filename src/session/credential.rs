use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Fixed key the credential record is stored under
pub const CREDENTIAL_KEY: &str = "examsy_auth";

/// Locally persisted role, e.g. `{"role":"PROCTOR","roomId":"R1"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Credential {
    Admin,
    Proctor {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Where the local credential lives. Written at login, cleared at logout and self-heal.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Key-value JSON file holding the credential under [`CREDENTIAL_KEY`]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| SyncError::CredentialStorage(format!("{}: {}", self.path.display(), e)))?;
        if raw.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str(&raw) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(SyncError::CredentialDecode("storage file is not an object".to_string())),
            Err(e) => Err(SyncError::CredentialDecode(e.to_string())),
        }
    }

    fn write_entries(&self, entries: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
            .map_err(|e| SyncError::CredentialStorage(format!("{}: {}", self.path.display(), e)))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let entries = self.read_entries()?;
        match entries.get(CREDENTIAL_KEY) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| SyncError::CredentialDecode(e.to_string())),
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        // a corrupt file is overwritten rather than blocking login
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(CREDENTIAL_KEY.to_string(), serde_json::to_value(credential)?);
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.read_entries().unwrap_or_default();
        if entries.remove(CREDENTIAL_KEY).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

/// Process-local credential, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    slot: Arc<Mutex<Option<Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(credential: Credential) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(credential))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Credential>>> {
        self.slot
            .lock()
            .map_err(|_| SyncError::CredentialStorage("credential slot poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.lock()? = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
