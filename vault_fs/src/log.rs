use std::sync::Arc;

use vault_core::{Hash, Identity, SignedEvent, Store, VaultError, VaultResult};

const EVENT_EXTENSION: &str = ".bin";

/// Append-only log of signed events, one file per event.
///
/// Events of an identity live at `<hex(public_key)>/<hex(event_hash)>.bin`.
/// The file name is the hash of the canonical payload, so an event can only
/// be stored once and nothing in this API rewrites or removes one.
#[derive(Debug, Clone)]
pub struct EventLog {
    store: Arc<dyn Store>,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn event_path(identity: &Identity, event_hash: Hash) -> String {
        format!(
            "{}/{}{EVENT_EXTENSION}",
            identity.namespace(),
            event_hash.to_hex()
        )
    }

    /// Writes `event` and returns its hash. Storing the same event again
    /// rewrites identical bytes.
    pub async fn store_event(&self, identity: &Identity, event: &SignedEvent) -> VaultResult<Hash> {
        let event_hash = event.event_hash()?;
        let path = Self::event_path(identity, event_hash);
        self.store.put_bytes(&path, event.to_bytes()?).await?;
        tracing::debug!(
            "eventlog: appended {:?} {} for {}",
            event.payload.event_type(),
            event_hash.fmt_short(),
            &identity.namespace()[..10]
        );
        Ok(event_hash)
    }

    /// Hashes of every event stored for `identity`, ascending.
    ///
    /// Names without the `.bin` extension (temporary write artifacts and
    /// the like) are skipped; a `.bin` name that is not a hash is an error.
    pub async fn list_events(&self, identity: &Identity) -> VaultResult<Vec<Hash>> {
        let names = self.store.list(&identity.namespace()).await?;
        let mut hashes = Vec::with_capacity(names.len());
        for name in names {
            let Some(stem) = name.strip_suffix(EVENT_EXTENSION) else {
                tracing::trace!("eventlog: ignoring {name}");
                continue;
            };
            hashes.push(Hash::from_hex(stem)?);
        }
        hashes.sort();
        Ok(hashes)
    }

    pub async fn retrieve_event(&self, identity: &Identity, event_hash: Hash) -> VaultResult<SignedEvent> {
        let path = Self::event_path(identity, event_hash);
        let bytes = match self.store.open_read_bytes(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(VaultError::NotFound(format!("event {event_hash}")));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(SignedEvent::from_bytes(&bytes)?)
    }
}
