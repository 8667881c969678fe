use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// No token has been registered for the user.
    #[error("Missing platform token for user {user_id}")]
    MissingToken { user_id: String },

    /// The platform refused the token.
    #[error("survey platform token is not valid")]
    InvalidToken,

    #[error("Stored token for user {user_id} is corrupted: {reason}")]
    TokenCorrupted { user_id: String, reason: String },

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;
