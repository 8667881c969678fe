//! Storage Abstractions
//!
//! Secure credential storage and the artifact store downloaded files land in.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts OS secret stores (Keychain, Secret Service, DPAPI).
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest
/// - Never log or expose stored values
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("survey_token:alice", token.as_bytes()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}

/// Contents of a downloaded artifact.
///
/// Spreadsheet and archive formats arrive as bytes; csv, geojson and json as text.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Binary(Bytes),
    Text(String),
}

impl ArtifactContent {
    pub fn len(&self) -> usize {
        match self {
            ArtifactContent::Binary(bytes) => bytes.len(),
            ArtifactContent::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            ArtifactContent::Binary(bytes) => bytes,
            ArtifactContent::Text(text) => Bytes::from(text),
        }
    }
}

/// Where a stored artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub location: PathBuf,
    pub size: u64,
}

/// Artifact store trait
///
/// Materializes downloaded files for a dataset. Writing the same name twice
/// replaces the previous artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write an artifact under `namespace` (the owning dataset id).
    async fn write_artifact(
        &self,
        namespace: &str,
        file_name: &str,
        content: ArtifactContent,
    ) -> Result<StoredArtifact>;

    /// Read a previously written artifact.
    async fn read_artifact(&self, namespace: &str, file_name: &str) -> Result<Bytes>;
}
