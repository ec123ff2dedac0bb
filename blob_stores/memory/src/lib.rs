use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use vault_core::store::{StoreError, StoreResult, validate_path};

/// An in-memory `Store`, used by tests and ephemeral vaults.
///
/// Clones share the same backing map, so two services built over clones of
/// one `MemoryStore` observe the same vault.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<DashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn dir_prefix(dir: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/")
}

#[async_trait::async_trait]
impl vault_core::store::Store for MemoryStore {
    /// Stores `bytes` under `path`, replacing any previous value.
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        validate_path(path)?;
        self.objects.insert(path.to_string(), bytes);
        Ok(())
    }

    /// Returns the bytes at `path`, or `NotFound`.
    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        validate_path(path)?;
        self.objects
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    /// Lists the names of keys directly under `dir`.
    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        validate_path(dir)?;
        let prefix = dir_prefix(dir);
        Ok(self
            .objects
            .iter()
            .filter_map(|entry| {
                let rest = entry.key().strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    /// Only validates `path`. Directories are implicit in the key space.
    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        validate_path(path)
    }

    /// Checks if a key exists at the given path.
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        Ok(self.objects.contains_key(path))
    }

    /// Removes `path` if present.
    async fn delete(&self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        self.objects.remove(path);
        Ok(())
    }
}
