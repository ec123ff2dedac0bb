//! The signed envelope in which events are stored.
//!
//! On disk an event is `u32 payload_len ‖ payload ‖ signature`, all big-endian,
//! where the signature is a 64-byte P-256 ECDSA `r ‖ s` over the payload bytes.
//! Decoding rejects short input, oversized lengths and trailing bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    Hash,
    crypto::{Crypto, SIGNATURE_SIZE},
    error::{DecodeError, VaultError, VaultResult},
    identity::{Identity, KeyPair},
};

use super::codec::{EventPayload, Reader};

/// Upper bound on an encoded payload inside an envelope.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// An event payload together with the P-256 ECDSA signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvent {
    pub payload: EventPayload,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl SignedEvent {
    /// Signs the canonical encoding of `payload` with `keys`.
    pub fn sign(payload: EventPayload, keys: &KeyPair, crypto: &dyn Crypto) -> VaultResult<Self> {
        let bytes = payload.to_bytes()?;
        let signature = crypto.sign(&bytes, keys)?;
        Ok(Self { payload, signature })
    }

    /// Checks the signature over the re-encoded payload against `identity`.
    pub fn verify(&self, identity: &Identity, crypto: &dyn Crypto) -> VaultResult<()> {
        let bytes = self.payload.to_bytes()?;
        if !crypto.verify(&bytes, &self.signature, identity) {
            return Err(VaultError::verification(format!(
                "bad signature on {:?} event for {:?}",
                self.payload.event_type(),
                self.payload.filename()
            )));
        }
        Ok(())
    }

    pub fn event_hash(&self) -> VaultResult<Hash> {
        self.payload.event_hash()
    }

    /// Serializes the event for storage.
    ///
    /// Format:
    /// - 4 bytes: payload length (big-endian)
    /// - N bytes: canonical payload
    /// - 64 bytes: signature
    pub fn to_bytes(&self) -> VaultResult<Bytes> {
        let payload = self.payload.to_bytes()?;
        let mut buf = BytesMut::with_capacity(4 + payload.len() + SIGNATURE_SIZE);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);
        buf.put_slice(&self.signature);
        Ok(buf.freeze())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader(bytes);
        let payload_bytes = reader.len_prefixed("payload", MAX_PAYLOAD_LEN)?;
        let signature = reader.array::<SIGNATURE_SIZE>()?;
        reader.finish()?;

        let payload = EventPayload::from_bytes(payload_bytes)?;
        Ok(Self { payload, signature })
    }
}
