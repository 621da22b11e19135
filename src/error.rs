use thiserror::Error;

/// Error types for the synchronization and dispatch core
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport errors
    #[error("Remote store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Document {id} not found in collection {collection}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Subscription to {0} is closed")]
    SubscriptionClosed(String),

    /// Document decoding errors
    #[error("Failed to decode document {id} in {collection}: {reason}")]
    DocumentDecode {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Payload is not a JSON object: {0}")]
    InvalidPayload(String),

    /// Local credential errors
    #[error("Failed to access credential storage: {0}")]
    CredentialStorage(String),

    #[error("Stored credential is malformed: {0}")]
    CredentialDecode(String),

    /// Session errors
    #[error("Cannot {action} from state {from}")]
    InvalidTransition { from: String, action: &'static str },

    /// Import errors
    #[error("Failed to read import file: {0}")]
    ImportRead(String),

    #[error("Failed to serialize document: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Helper to create transport errors
    pub fn store(msg: impl Into<String>) -> Self {
        SyncError::StoreUnavailable(msg.into())
    }

    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::DocumentNotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Whether the error came from the transport rather than local data
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::StoreUnavailable(_)
                | SyncError::DocumentNotFound { .. }
                | SyncError::SubscriptionClosed(_)
        )
    }
}
