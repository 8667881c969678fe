use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or refused platform token
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Export request rejected: {0}")]
    RemoteValidation(String),

    #[error("Survey {asset_id} has no submissions")]
    EmptySurvey { asset_id: String },

    #[error("Survey {asset_id} is linked to {count} datasets")]
    Duplicate { asset_id: String, count: usize },

    #[error("Survey {asset_id} is already imported as dataset {dataset_id}")]
    AlreadyImported { asset_id: String, dataset_id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Synchronization already running for dataset {dataset_id}")]
    SyncInProgress { dataset_id: String },

    /// A newer cycle owns the resource; the write was fenced out.
    #[error("Resource {resource_id} left cycle {cycle}")]
    StaleCycle { resource_id: String, cycle: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Artifact storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Unauthorized(msg) => SyncError::Auth(msg),
            BridgeError::Rejected(msg) => SyncError::RemoteValidation(msg),
            BridgeError::NotFound(msg) => SyncError::NotFound {
                entity: "Remote entity",
                id: msg,
            },
            BridgeError::Io(e) => SyncError::Storage(e.to_string()),
            BridgeError::Transport(msg)
            | BridgeError::InvalidResponse(msg)
            | BridgeError::OperationFailed(msg)
            | BridgeError::NotAvailable(msg) => SyncError::Transport(msg),
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(error: AuthError) -> Self {
        SyncError::Auth(error.to_string())
    }
}
