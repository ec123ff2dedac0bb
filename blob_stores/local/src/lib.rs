use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vault_core::store::{StoreError, StoreResult, validate_path};

const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalStoreConfig {
    pub base_path: String,
}

/// A `Store` rooted at a local directory (or a synced / network-mounted one).
///
/// Writes go to a hidden temporary sibling which is flushed and then renamed
/// over the target, so readers only ever see complete files. Temporaries
/// orphaned by a crash are skipped by `list`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalStore {
            base_path: base_path.into(),
        }
    }

    pub fn create(config: LocalStoreConfig) -> Self {
        Self::new(config.base_path)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, path: &str) -> StoreResult<PathBuf> {
        validate_path(path)?;
        Ok(self.base_path.join(path))
    }

    fn is_temp_name(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
    }

    fn temp_path_for(full_path: &Path) -> StoreResult<PathBuf> {
        let file_name = full_path
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(full_path.display().to_string()))?;
        let temp_name = format!(
            ".{}.{}{TEMP_SUFFIX}",
            file_name.to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        );
        Ok(full_path.with_file_name(temp_name))
    }
}

fn map_not_found(e: std::io::Error, path: &str) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(e)
    }
}

#[async_trait::async_trait]
impl vault_core::store::Store for LocalStore {
    /// Writes `bytes` to a temporary sibling, syncs it and renames it over `path`.
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        let full_path = self.resolve_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path_for(&full_path)?;
        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, &full_path).await
        };

        if let Err(e) = write.await {
            // Best effort: the temp file is invisible to readers either way.
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads the whole file at `path`. A missing file is `NotFound`.
    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        let full_path = self.resolve_path(path)?;
        let data = tokio::fs::read(&full_path)
            .await
            .map_err(|e| map_not_found(e, path))?;
        Ok(Bytes::from(data))
    }

    /// Lists the entry names directly under `dir`, skipping temporaries.
    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        let full_path = self.resolve_path(dir)?;
        let mut entries = match tokio::fs::read_dir(&full_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_temp_name(&name) {
                tracing::trace!("localstore: skipping in-flight temp file {name}");
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Creates `path` and any missing parents.
    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        let full_path = self.resolve_path(path)?;
        tokio::fs::create_dir_all(&full_path).await?;
        Ok(())
    }

    /// Checks if a file exists at the given path.
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let full_path = self.resolve_path(path)?;
        tokio::fs::try_exists(&full_path).await.map_err(Into::into)
    }

    /// Removes the file at `path`. Deleting a missing file succeeds.
    async fn delete(&self, path: &str) -> StoreResult<()> {
        let full_path = self.resolve_path(path)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
