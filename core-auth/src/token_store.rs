//! Secure Token Storage
//!
//! Persists one survey platform token per local user through the host's
//! `SecureStore` and resolves it again on demand.
//!
//! ## Security Features
//!
//! - Tokens are never logged or carried in error messages
//! - Corrupted entries are erased on read
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{CredentialResolver, TokenStore, UserId};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//! let user = UserId::new("field_officer");
//!
//! token_store.store_token(&user, "0df5c1e7").await?;
//! let token = token_store.token_for(&user).await?;
//! token_store.delete_token(&user).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::UserId;
use async_trait::async_trait;
use bridge_traits::storage::SecureStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves the platform token for a user.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Fails with [`AuthError::MissingToken`] when no token is registered.
    async fn token_for(&self, user: &UserId) -> Result<String>;
}

/// Secure storage for platform tokens
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    stored_at: i64,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Store a token for a user, replacing any previous one.
    pub async fn store_token(&self, user: &UserId, token: &str) -> Result<()> {
        let key = self.storage_key(user);

        let stored = StoredToken {
            token: token.to_string(),
            stored_at: Utc::now().timestamp(),
        };

        let json = serde_json::to_vec(&stored).map_err(|e| {
            warn!(user_id = %user, error = %e, "Failed to serialize token");
            AuthError::from(e)
        })?;

        self.secure_store
            .set_secret(&key, &json)
            .await
            .map_err(|e| {
                warn!(
                    user_id = %user,
                    error = %e,
                    "Failed to store token in secure storage"
                );
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(user_id = %user, "Token stored securely");

        Ok(())
    }

    /// Retrieve a user's token.
    ///
    /// Returns `Ok(None)` if no token exists. A corrupted entry is deleted and
    /// reported as [`AuthError::TokenCorrupted`].
    pub async fn retrieve_token(&self, user: &UserId) -> Result<Option<String>> {
        let key = self.storage_key(user);

        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(
                user_id = %user,
                error = %e,
                "Failed to retrieve token from secure storage"
            );
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(user_id = %user, "No token found in storage");
            return Ok(None);
        };

        let stored: StoredToken = match serde_json::from_slice(&data) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    user_id = %user,
                    error = %e,
                    "Failed to deserialize token, it may be corrupted"
                );

                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(
                        user_id = %user,
                        error = %delete_err,
                        "Failed to delete corrupted token data"
                    );
                }

                return Err(AuthError::TokenCorrupted {
                    user_id: user.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        debug!(user_id = %user, stored_at = stored.stored_at, "Token retrieved");

        Ok(Some(stored.token))
    }

    /// Delete a user's token. Succeeds when none exists.
    pub async fn delete_token(&self, user: &UserId) -> Result<()> {
        let key = self.storage_key(user);

        self.secure_store.delete_secret(&key).await.map_err(|e| {
            warn!(
                user_id = %user,
                error = %e,
                "Failed to delete token from secure storage"
            );
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        info!(user_id = %user, "Token deleted");

        Ok(())
    }

    pub async fn has_token(&self, user: &UserId) -> Result<bool> {
        let key = self.storage_key(user);

        self.secure_store
            .has_secret(&key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    fn storage_key(&self, user: &UserId) -> String {
        format!("survey_token:{}", user)
    }
}

#[async_trait]
impl CredentialResolver for TokenStore {
    async fn token_for(&self, user: &UserId) -> Result<String> {
        match self.retrieve_token(user).await? {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::MissingToken {
                user_id: user.to_string(),
            }),
        }
    }
}
