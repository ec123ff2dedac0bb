use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use vault_core::{
    BlobStore, Crypto, Hash, KeyPair, Secret, SignedEvent, Store, VaultError, VaultResult,
    event::{
        CreateFile, DeleteFile, EventPayload,
        codec::{MAX_FILENAME_LEN, MAX_MIME_LEN},
    },
};

use crate::{
    clock::Clock,
    log::EventLog,
    replay::{self, FileMetadata, FileSystemState, LogEntry},
};

/// What a caller sees after opening a vault: the public namespace and the
/// live files. Never carries the secret or any private key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub public_key: String,
    pub files: Vec<FileMetadata>,
}

/// Result of [`VaultService::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub events: usize,
    pub live_files: usize,
    /// Live files whose block is absent from storage.
    pub missing_blocks: Vec<FileMetadata>,
    /// Live files whose stored block no longer hashes to its address.
    pub corrupt_blocks: Vec<FileMetadata>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.missing_blocks.is_empty() && self.corrupt_blocks.is_empty()
    }
}

/// File operations over a secret-derived identity.
///
/// The service holds no per-identity state. Each call derives the key pair
/// from the secret and, for reads, replays the identity's log from storage,
/// so any number of services (in any number of processes) can share one
/// store without coordination.
#[derive(Debug, Clone)]
pub struct VaultService {
    crypto: Arc<dyn Crypto>,
    clock: Arc<dyn Clock>,
    blobs: BlobStore,
    log: EventLog,
}

impl VaultService {
    pub fn new(crypto: Arc<dyn Crypto>, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            crypto,
            clock,
            blobs: BlobStore::from_arc(store.clone()),
            log: EventLog::new(store),
        }
    }

    pub async fn open(&self, secret: &str) -> VaultResult<Volume> {
        let keys = self.derive_keys(secret).await?;
        let state = self.replay(&keys).await?;
        let identity = keys.identity();
        tracing::info!(
            "vault: opened {} with {} files",
            &identity.namespace()[..10],
            state.len()
        );
        Ok(Volume {
            public_key: identity.public_key_hex(),
            files: state.listing(),
        })
    }

    pub async fn add_file(
        &self,
        secret: &str,
        filename: &str,
        data: impl Into<Bytes>,
        mime_type: Option<&str>,
    ) -> VaultResult<FileMetadata> {
        validate_filename(filename)?;
        if let Some(mime) = mime_type {
            if mime.len() > MAX_MIME_LEN {
                return Err(VaultError::validation(format!(
                    "mime type exceeds {MAX_MIME_LEN} bytes"
                )));
            }
        }
        let data: Bytes = data.into();

        let keys = self.derive_keys(secret).await?;
        let key = self.crypto.derive_symmetric_key(keys.private_scalar());
        let ciphertext = self.crypto.encrypt_sym(&data, &key)?;
        let block_hash = self.blobs.store_block(Bytes::from(ciphertext), true).await?;

        let create = CreateFile {
            filename: filename.to_string(),
            block_hash,
            size: data.len() as u64,
            mime_type: mime_type.map(str::to_string),
            created_at: self.clock.now_millis(),
            encrypted_key: Bytes::new(),
        };
        let metadata = FileMetadata::from(&create);
        let event = SignedEvent::sign(EventPayload::CreateFile(create), &keys, &*self.crypto)?;
        let event_hash = self.log.store_event(&keys.identity(), &event).await?;

        tracing::info!(
            "vault: added {filename:?} ({} bytes) as block {} event {}",
            metadata.size,
            block_hash.fmt_short(),
            event_hash.fmt_short()
        );
        Ok(metadata)
    }

    /// Appends a delete for `filename`. The current state is not consulted:
    /// deleting a name that is not live is a no-op at replay.
    pub async fn delete_file(&self, secret: &str, filename: &str) -> VaultResult<()> {
        validate_filename(filename)?;
        let keys = self.derive_keys(secret).await?;

        let delete = DeleteFile {
            filename: filename.to_string(),
            deleted_at: self.clock.now_millis(),
        };
        let event = SignedEvent::sign(EventPayload::DeleteFile(delete), &keys, &*self.crypto)?;
        let event_hash = self.log.store_event(&keys.identity(), &event).await?;

        tracing::info!("vault: deleted {filename:?} in event {}", event_hash.fmt_short());
        Ok(())
    }

    /// Live files sorted by `(created_at, filename)`.
    pub async fn list_files(&self, secret: &str) -> VaultResult<Vec<FileMetadata>> {
        let keys = self.derive_keys(secret).await?;
        Ok(self.replay(&keys).await?.listing())
    }

    /// Decrypts the block at `block_hash`. Blocks stay readable after the
    /// file that referenced them was deleted.
    pub async fn get_file(&self, secret: &str, block_hash: Hash) -> VaultResult<Bytes> {
        let keys = self.derive_keys(secret).await?;
        self.read_block(&keys, block_hash).await
    }

    pub async fn get_file_by_name(&self, secret: &str, filename: &str) -> VaultResult<Bytes> {
        validate_filename(filename)?;
        let keys = self.derive_keys(secret).await?;
        let state = self.replay(&keys).await?;
        let file = state
            .get(filename)
            .ok_or_else(|| VaultError::NotFound(format!("file {filename:?}")))?;
        self.read_block(&keys, file.block_hash).await
    }

    /// The verified event log in replay order.
    pub async fn history(&self, secret: &str) -> VaultResult<Vec<LogEntry>> {
        let keys = self.derive_keys(secret).await?;
        replay::verified_history(&self.log, &keys.identity(), &*self.crypto).await
    }

    /// Replays the log and checks the block of every live file.
    ///
    /// Missing or corrupt blocks are reported, not repaired. Failures of the
    /// replay itself are returned as errors like everywhere else.
    pub async fn verify(&self, secret: &str) -> VaultResult<IntegrityReport> {
        let keys = self.derive_keys(secret).await?;
        let entries = replay::verified_history(&self.log, &keys.identity(), &*self.crypto).await?;
        let state = replay::fold(&entries);

        let mut report = IntegrityReport {
            events: entries.len(),
            live_files: state.len(),
            ..Default::default()
        };
        for file in state.listing() {
            match self.blobs.retrieve_block(file.block_hash).await {
                Ok(_) => {}
                Err(VaultError::NotFound(_)) => {
                    tracing::warn!("vault: block for {:?} is missing", file.filename);
                    report.missing_blocks.push(file);
                }
                Err(VaultError::Verification(_)) => {
                    tracing::warn!("vault: block for {:?} is corrupt", file.filename);
                    report.corrupt_blocks.push(file);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn derive_keys(&self, secret: &str) -> VaultResult<KeyPair> {
        let secret = Secret::new(secret)?;
        let crypto = self.crypto.clone();
        tokio::task::spawn_blocking(move || crypto.derive_keys(&secret))
            .await
            .map_err(|e| VaultError::KeyDerivation(format!("derivation task failed: {e}")))?
    }

    async fn replay(&self, keys: &KeyPair) -> VaultResult<FileSystemState> {
        replay::materialize(&self.log, &keys.identity(), &*self.crypto).await
    }

    /// A block that no longer matches its address was rewritten in place;
    /// to the reader that is failed authentication, like any other tamper.
    async fn read_block(&self, keys: &KeyPair, block_hash: Hash) -> VaultResult<Bytes> {
        let ciphertext = match self.blobs.retrieve_block(block_hash).await {
            Ok(ciphertext) => ciphertext,
            Err(VaultError::Verification(msg)) => {
                tracing::warn!("vault: rejecting block {}: {msg}", block_hash.fmt_short());
                return Err(VaultError::Decryption);
            }
            Err(e) => return Err(e),
        };
        let key = self.crypto.derive_symmetric_key(keys.private_scalar());
        let plaintext = self.crypto.decrypt_sym(&ciphertext, &key)?;
        Ok(Bytes::from(plaintext))
    }
}

/// Filenames must contain a non-whitespace character and fit the codec limit.
fn validate_filename(filename: &str) -> VaultResult<()> {
    if filename.trim().is_empty() {
        return Err(VaultError::validation("filename must not be empty"));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(VaultError::validation(format!(
            "filename exceeds {MAX_FILENAME_LEN} bytes"
        )));
    }
    Ok(())
}
