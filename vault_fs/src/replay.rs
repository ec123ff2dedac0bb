//! Materialization of an identity's event log.
//!
//! Replay runs four stages on every call, with no cache in between:
//!
//! 1. **load**: list the identity's event hashes and read each envelope.
//! 2. **verify**: the hash of the re-encoded payload must equal the storage
//!    key, and the signature must verify against the identity's public key.
//! 3. **order**: sort by [`OrderKey`].
//! 4. **fold**: creates insert or overwrite, deletes remove.
//!
//! Any failure in any stage fails the whole replay. There is no partial or
//! best-effort state.

use std::collections::BTreeMap;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use vault_core::{
    Crypto, Hash, Identity, SignedEvent, VaultError, VaultResult,
    event::{CreateFile, EventPayload},
};

use crate::log::EventLog;

/// Upper bound on event reads in flight during `load`.
pub const MAX_CONCURRENT_READS: usize = 32;

/// What a listing exposes about a live file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub filename: String,
    pub block_hash: Hash,
    pub size: u64,
    pub mime_type: Option<String>,
    pub created_at: u64,
}

impl From<&CreateFile> for FileMetadata {
    fn from(create: &CreateFile) -> Self {
        Self {
            filename: create.filename.clone(),
            block_hash: create.block_hash,
            size: create.size,
            mime_type: create.mime_type.clone(),
            created_at: create.created_at,
        }
    }
}

/// A verified event together with the key it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub event_hash: Hash,
    pub event: SignedEvent,
}

impl LogEntry {
    pub fn order_key(&self) -> OrderKey<'_> {
        let payload = &self.event.payload;
        let discriminator = match payload {
            EventPayload::CreateFile(c) => (0, *c.block_hash.as_bytes()),
            EventPayload::DeleteFile(_) => (1, [0xff; 32]),
        };
        OrderKey {
            timestamp: payload.timestamp(),
            filename: payload.filename().as_bytes(),
            discriminator,
            event_hash: self.event_hash,
        }
    }
}

/// Total order over events.
///
/// Compared field by field: timestamp, filename bytes, then a discriminator
/// placing a delete after every create of the same file in the same
/// millisecond (creates among themselves by block hash), and finally the
/// event hash.
///
/// Two writes to one name within the same millisecond are therefore won by
/// the larger block hash, which is random, not by the later call. Writers
/// that need "last call wins" must let the clock tick between writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey<'a> {
    pub timestamp: u64,
    pub filename: &'a [u8],
    pub discriminator: (u8, [u8; 32]),
    pub event_hash: Hash,
}

/// The set of live files. Never persisted; rebuilt by every replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSystemState {
    files: BTreeMap<String, FileMetadata>,
}

impl FileSystemState {
    pub fn apply(&mut self, payload: &EventPayload) {
        match payload {
            EventPayload::CreateFile(create) => {
                self.files
                    .insert(create.filename.clone(), FileMetadata::from(create));
            }
            EventPayload::DeleteFile(delete) => {
                // deleting an absent name is a no-op
                self.files.remove(&delete.filename);
            }
        }
    }

    pub fn get(&self, filename: &str) -> Option<&FileMetadata> {
        self.files.get(filename)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMetadata> {
        self.files.values()
    }

    /// Live files sorted by `(created_at, filename)`.
    pub fn listing(&self) -> Vec<FileMetadata> {
        let mut files: Vec<FileMetadata> = self.files.values().cloned().collect();
        files.sort_by(|a, b| {
            (a.created_at, a.filename.as_bytes()).cmp(&(b.created_at, b.filename.as_bytes()))
        });
        files
    }
}

pub async fn load(log: &EventLog, identity: &Identity) -> VaultResult<Vec<LogEntry>> {
    let hashes = log.list_events(identity).await?;
    stream::iter(hashes)
        .map(|event_hash| async move {
            let event = log.retrieve_event(identity, event_hash).await?;
            Ok::<_, VaultError>(LogEntry { event_hash, event })
        })
        .buffered(MAX_CONCURRENT_READS)
        .try_collect()
        .await
}

pub fn verify(entries: &[LogEntry], identity: &Identity, crypto: &dyn Crypto) -> VaultResult<()> {
    for entry in entries {
        let canonical = entry.event.payload.to_bytes()?;
        let actual = crypto.compute_hash(&canonical);
        if actual != entry.event_hash {
            return Err(VaultError::verification(format!(
                "event stored as {} hashes to {}",
                entry.event_hash, actual
            )));
        }
        entry.event.verify(identity, crypto)?;
    }
    Ok(())
}

pub fn order(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

pub fn fold<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> FileSystemState {
    let mut state = FileSystemState::default();
    for entry in entries {
        state.apply(&entry.event.payload);
    }
    state
}

/// Loads, verifies and orders the log. The returned entries are in fold order.
pub async fn verified_history(
    log: &EventLog,
    identity: &Identity,
    crypto: &dyn Crypto,
) -> VaultResult<Vec<LogEntry>> {
    let mut entries = load(log, identity).await?;
    verify(&entries, identity, crypto)?;
    order(&mut entries);
    tracing::debug!(
        "replay: verified {} events for {}",
        entries.len(),
        &identity.namespace()[..10]
    );
    Ok(entries)
}

pub async fn materialize(
    log: &EventLog,
    identity: &Identity,
    crypto: &dyn Crypto,
) -> VaultResult<FileSystemState> {
    let entries = verified_history(log, identity, crypto).await?;
    Ok(fold(&entries))
}
