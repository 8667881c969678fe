//! Artifact Storage Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ArtifactContent, ArtifactStore, StoredArtifact},
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Tokio-based artifact store
///
/// Lays files out as `{root}/{namespace}/{file_name}`. Writes go to a
/// sibling `.part` file first and are renamed into place, so a reader never
/// observes a half-written artifact.
pub struct TokioArtifactStore {
    root: PathBuf,
}

impl TokioArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted in the platform data directory.
    pub fn in_data_dir() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("survey-sync")
            .join("artifacts");

        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    /// A path component must not escape its parent.
    fn check_component(kind: &str, value: &str) -> Result<()> {
        let invalid = value.is_empty()
            || value == "."
            || value == ".."
            || value.contains('/')
            || value.contains('\\');

        if invalid {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid artifact {}: {:?}",
                kind, value
            )));
        }
        Ok(())
    }

    fn artifact_path(&self, namespace: &str, file_name: &str) -> Result<PathBuf> {
        Self::check_component("namespace", namespace)?;
        Self::check_component("file name", file_name)?;
        Ok(self.root.join(namespace).join(file_name))
    }
}

#[async_trait]
impl ArtifactStore for TokioArtifactStore {
    async fn write_artifact(
        &self,
        namespace: &str,
        file_name: &str,
        content: ArtifactContent,
    ) -> Result<StoredArtifact> {
        let path = self.artifact_path(namespace, file_name)?;
        let Some(parent) = path.parent() else {
            return Err(BridgeError::OperationFailed(format!(
                "Artifact path has no parent: {}",
                path.display()
            )));
        };

        fs::create_dir_all(parent)
            .await
            .map_err(Self::map_io_error)?;

        let data = content.into_bytes();
        let staging = parent.join(format!("{}.part", file_name));

        let mut file = fs::File::create(&staging)
            .await
            .map_err(Self::map_io_error)?;
        file.write_all(data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        file.flush().await.map_err(Self::map_io_error)?;
        drop(file);

        fs::rename(&staging, &path)
            .await
            .map_err(Self::map_io_error)?;

        debug!(namespace, file_name, size = data.len(), "Wrote artifact");

        Ok(StoredArtifact {
            location: path,
            size: data.len() as u64,
        })
    }

    async fn read_artifact(&self, namespace: &str, file_name: &str) -> Result<Bytes> {
        let path = self.artifact_path(namespace, file_name)?;

        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BridgeError::NotFound(format!("Artifact {}/{}", namespace, file_name))
            } else {
                Self::map_io_error(e)
            }
        })?;

        debug!(namespace, file_name, size = data.len(), "Read artifact");
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> TokioArtifactStore {
        let root = std::env::temp_dir().join(format!("survey-sync-test-{}", uuid::Uuid::new_v4()));
        TokioArtifactStore::new(root)
    }

    #[tokio::test]
    async fn test_write_and_read_text_artifact() {
        let store = scratch_store();

        let stored = store
            .write_artifact("d1", "aXk3.csv", ArtifactContent::Text("a,b\n1,2\n".into()))
            .await
            .unwrap();

        assert_eq!(stored.size, 8);
        assert_eq!(stored.location, store.root().join("d1").join("aXk3.csv"));

        let data = store.read_artifact("d1", "aXk3.csv").await.unwrap();
        assert_eq!(data.as_ref(), b"a,b\n1,2\n");

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_rewrite_replaces_artifact() {
        let store = scratch_store();

        store
            .write_artifact("d1", "aXk3.xls", ArtifactContent::Binary(Bytes::from_static(b"old")))
            .await
            .unwrap();
        store
            .write_artifact("d1", "aXk3.xls", ArtifactContent::Binary(Bytes::from_static(b"newer")))
            .await
            .unwrap();

        let data = store.read_artifact("d1", "aXk3.xls").await.unwrap();
        assert_eq!(data.as_ref(), b"newer");
        assert!(!store.root().join("d1").join("aXk3.xls.part").exists());

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let store = scratch_store();
        let err = store.read_artifact("d1", "nothing.csv").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let store = scratch_store();

        for (namespace, name) in [("..", "a.csv"), ("d1", "../a.csv"), ("d1", ""), ("d/1", "a.csv")] {
            let err = store
                .write_artifact(namespace, name, ArtifactContent::Text(String::new()))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Invalid artifact"));
        }
    }
}
