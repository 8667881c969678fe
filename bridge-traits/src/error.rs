use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote side refused the credentials (401/403).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure or a non-success HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered, but the body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The remote rejected the request payload.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
