//! Storage backend contract.
//!
//! A `Store` is a dumb, untrusted byte container addressed by relative
//! `/`-separated paths: a local folder, a synced directory, a network share.
//! Everything above it (blocks, events) is content-addressed, so the store
//! needs no locking. It does need atomic writes: a reader must never observe
//! a partially written file. Backends write to a temporary sibling and
//! rename it into place; a crash before the rename leaves only an orphaned
//! temporary artifact that listing callers ignore.

use async_trait::async_trait;
use bytes::Bytes;

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path {0:?}: must be relative and must not contain '..'")]
    InvalidPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync + 'static {
    /// Atomically writes `bytes` to `path`, creating parent directories.
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()>;

    /// Reads the whole object at `path`. Missing objects are `StoreError::NotFound`.
    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes>;

    /// Names of the files directly inside `dir`. A missing directory lists as empty.
    async fn list(&self, dir: &str) -> StoreResult<Vec<String>>;

    async fn create_dir(&self, path: &str) -> StoreResult<()>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Removes `path`. Deleting an absent object is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        (**self).put_bytes(path, bytes).await
    }

    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        (**self).open_read_bytes(path).await
    }

    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        (**self).list(dir).await
    }

    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        (**self).create_dir(path).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        (**self).exists(path).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        (**self).delete(path).await
    }
}

/// Rejects absolute paths and parent traversal. Shared by all backends.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment == "..")
        || path.contains('\\')
    {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}
