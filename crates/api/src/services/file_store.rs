//! Object storage for uploaded archives, images and automation inputs.
//!
//! Objects live under a bucket and a slash-separated key. [`LocalFileStore`]
//! maps them onto `<root>/<bucket>/<key>` on disk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::AppError;

pub const MODELS_BUCKET: &str = "models";
pub const IMAGES_BUCKET: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(key) => AppError::BadRequest(format!("Invalid file path: {key}")),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        for part in [bucket, key] {
            let path = Path::new(part);
            let clean = !part.is_empty()
                && path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !clean {
                return Err(StorageError::InvalidKey(format!("{bucket}/{key}")));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(bucket, key, size = bytes.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("{bucket}/{key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("agora-store-{name}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn put_get_delete() {
        let root = scratch_root("roundtrip");
        let store = LocalFileStore::new(&root);

        store.put(MODELS_BUCKET, "7/1700_model.zip", b"PK..").await.unwrap();
        assert_eq!(store.get(MODELS_BUCKET, "7/1700_model.zip").await.unwrap(), b"PK..");

        store.delete(MODELS_BUCKET, "7/1700_model.zip").await.unwrap();
        assert!(matches!(
            store.get(MODELS_BUCKET, "7/1700_model.zip").await,
            Err(StorageError::NotFound(_))
        ));
        store.delete(MODELS_BUCKET, "7/1700_model.zip").await.unwrap();

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let store = LocalFileStore::new(scratch_root("traversal"));
        for key in ["../etc/passwd", "/abs/path", "a/../../b", ""] {
            assert!(matches!(
                store.put(MODELS_BUCKET, key, b"x").await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }
}
