//! Error types for the KoboToolbox provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// KoboToolbox provider errors
#[derive(Error, Debug)]
pub enum KoboError {
    /// Token missing, expired or lacking permission
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("KoboToolbox API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Export payload refused by the platform
    #[error("Export request rejected: {0}")]
    ExportRejected(String),

    /// Asset or export not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Format that cannot be requested from the export endpoint
    #[error("Invalid export format: {0}")]
    InvalidFormat(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for KoboToolbox operations
pub type Result<T> = std::result::Result<T, KoboError>;

impl KoboError {
    /// Classify a non-2xx platform response.
    pub fn from_status(status_code: u16, body: &[u8]) -> Self {
        let message = String::from_utf8_lossy(body).to_string();
        match status_code {
            401 | 403 => KoboError::AuthenticationFailed(message),
            404 => KoboError::NotFound(message),
            400 | 422 => KoboError::ExportRejected(message),
            _ => KoboError::ApiError {
                status_code,
                message,
            },
        }
    }
}

impl From<KoboError> for BridgeError {
    fn from(error: KoboError) -> Self {
        match error {
            KoboError::AuthenticationFailed(msg) => {
                BridgeError::Unauthorized(format!("Authentication failed: {}", msg))
            }
            KoboError::ApiError {
                status_code,
                message,
            } => BridgeError::Transport(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            KoboError::ExportRejected(msg) => BridgeError::Rejected(msg),
            KoboError::NotFound(msg) => BridgeError::NotFound(msg),
            KoboError::ParseError(msg) => {
                BridgeError::InvalidResponse(format!("Parse error: {}", msg))
            }
            KoboError::InvalidFormat(format) => {
                BridgeError::Rejected(format!("Invalid export format: {}", format))
            }
            KoboError::BridgeError(e) => e,
        }
    }
}
