use bytes::Bytes;
use std::sync::Arc;

use crate::{
    Hash,
    error::{VaultError, VaultResult},
    store::{Store, StoreError},
};

/// Directory holding every encrypted block, shared by all identities.
pub const BLOCKS_DIR: &str = "blocks";

const BLOCK_EXTENSION: &str = ".bin";

/// Content-addressed block storage built on top of a generic `Store`.
///
/// Blocks live at `blocks/<hex(hash)>.bin` where `hash` is the BLAKE3 hash of
/// the stored (encrypted) bytes. Blocks are write-once and never removed by
/// file operations. Deduplication only catches byte-identical ciphertext:
/// encrypting the same plaintext twice uses two nonces and so produces two
/// addresses.
#[derive(Debug, Clone)]
pub struct BlobStore {
    store: Arc<dyn Store>,
}

impl BlobStore {
    pub fn new<S>(store: S) -> Self
    where
        S: Store + 'static,
    {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn block_path_for_hash(hash: Hash) -> String {
        format!("{BLOCKS_DIR}/{}{BLOCK_EXTENSION}", hash.to_hex())
    }

    /// Parses a file name inside `blocks/`; anything else is not a block.
    pub fn hash_from_block_name(name: &str) -> Option<Hash> {
        name.strip_suffix(BLOCK_EXTENSION)
            .and_then(|stem| Hash::from_hex(stem).ok())
    }

    /// Stores `ciphertext` under its content address.
    ///
    /// With `skip_if_exists`, an already present block is left untouched.
    pub async fn store_block(&self, ciphertext: Bytes, skip_if_exists: bool) -> VaultResult<Hash> {
        let hash = Hash::new(&ciphertext);
        let path = Self::block_path_for_hash(hash);

        if skip_if_exists && self.store.exists(&path).await? {
            tracing::debug!("blockstore: {} already present, skipping", hash.fmt_short());
            return Ok(hash);
        }

        let len = ciphertext.len();
        self.store.put_bytes(&path, ciphertext).await?;
        tracing::debug!("blockstore: stored {} ({len} bytes)", hash.fmt_short());
        Ok(hash)
    }

    /// Reads the block stored under `hash` and checks it still hashes to its address.
    pub async fn retrieve_block(&self, hash: Hash) -> VaultResult<Bytes> {
        let path = Self::block_path_for_hash(hash);
        let bytes = match self.store.open_read_bytes(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(VaultError::NotFound(format!("block {hash}")));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = Hash::new(&bytes);
        if actual != hash {
            return Err(VaultError::verification(format!(
                "block {hash} content hashes to {actual}"
            )));
        }
        Ok(bytes)
    }

    pub async fn contains(&self, hash: Hash) -> VaultResult<bool> {
        Ok(self.store.exists(&Self::block_path_for_hash(hash)).await?)
    }

    /// Returns all block hashes currently stored under `blocks/`.
    pub async fn list_hashes(&self) -> VaultResult<Vec<Hash>> {
        let names = match self.store.list(BLOCKS_DIR).await {
            Ok(names) => names,
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut hashes: Vec<Hash> = names
            .iter()
            .filter_map(|name| Self::hash_from_block_name(name))
            .collect();
        hashes.sort();
        Ok(hashes)
    }
}
