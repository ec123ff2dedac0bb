//! Canonical, byte-exact encoding of event payloads.
//!
//! The encoded bytes are hashed (storage key and replay tie-break) and
//! signed, so every implementation must produce identical output for the
//! same logical payload and must reject every other byte sequence.
//!
//! Wire format (all integers big-endian):
//! - 1 byte: event type (`0x01` create, `0x02` delete)
//! - 4 bytes: filename length, then the UTF-8 filename
//! - 32 bytes: content hash (block hash for create, all zero for delete)
//! - 4 bytes: encrypted key material length, then the material (may be empty)
//! - Create:
//!   - 8 bytes: size
//!   - 8 bytes: created_at (Unix epoch milliseconds)
//!   - 1 byte: MIME presence flag (`0` or `1`)
//!   - if present: 4 bytes MIME length, then the UTF-8 MIME type
//! - Delete:
//!   - 8 bytes: deleted_at (Unix epoch milliseconds)
//!
//! Decoding fails on truncation, unknown types, overrunning lengths, invalid
//! UTF-8, unknown flags, trailing bytes, and non-canonical delete payloads.
//! Numeric fields are unsigned fixed-width integers, so negative or
//! non-finite values cannot be expressed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Hash,
    error::{DecodeError, VaultError, VaultResult},
};

pub const MAX_FILENAME_LEN: usize = 4096;
pub const MAX_MIME_LEN: usize = 255;
pub const MAX_KEY_MATERIAL_LEN: usize = 4096;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    CreateFile = 0x01,
    DeleteFile = 0x02,
}

impl TryFrom<u8> for EventType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(EventType::CreateFile),
            0x02 => Ok(EventType::DeleteFile),
            other => Err(DecodeError::UnknownEventType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFile {
    pub filename: String,
    pub block_hash: Hash,
    /// Plaintext length in bytes.
    pub size: u64,
    pub mime_type: Option<String>,
    pub created_at: u64,
    /// Reserved for wrapped per-file keys. Always empty for events written by this crate.
    pub encrypted_key: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFile {
    pub filename: String,
    pub deleted_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    CreateFile(CreateFile),
    DeleteFile(DeleteFile),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::CreateFile(_) => EventType::CreateFile,
            EventPayload::DeleteFile(_) => EventType::DeleteFile,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            EventPayload::CreateFile(c) => &c.filename,
            EventPayload::DeleteFile(d) => &d.filename,
        }
    }

    /// `created_at` for creates, `deleted_at` for deletes.
    pub fn timestamp(&self) -> u64 {
        match self {
            EventPayload::CreateFile(c) => c.created_at,
            EventPayload::DeleteFile(d) => d.deleted_at,
        }
    }

    /// Encodes the payload canonically.
    pub fn to_bytes(&self) -> VaultResult<Bytes> {
        let filename = self.filename();
        check_len("filename", filename.len(), MAX_FILENAME_LEN)?;
        if filename.is_empty() {
            return Err(VaultError::validation("filename must not be empty"));
        }

        let (content_hash, key_material): (&Hash, &[u8]) = match self {
            EventPayload::CreateFile(c) => (&c.block_hash, c.encrypted_key.as_ref()),
            EventPayload::DeleteFile(_) => (&Hash::ZERO, &[][..]),
        };
        check_len("encrypted key", key_material.len(), MAX_KEY_MATERIAL_LEN)?;

        let mut buf = BytesMut::with_capacity(1 + 4 + filename.len() + 32 + 4 + 8 + 8 + 1 + 4);
        buf.put_u8(self.event_type() as u8);
        put_len_prefixed(&mut buf, filename.as_bytes());
        buf.put_slice(content_hash.as_bytes());
        put_len_prefixed(&mut buf, key_material);

        match self {
            EventPayload::CreateFile(c) => {
                buf.put_u64(c.size);
                buf.put_u64(c.created_at);
                match &c.mime_type {
                    Some(mime) => {
                        check_len("mime type", mime.len(), MAX_MIME_LEN)?;
                        buf.put_u8(1);
                        put_len_prefixed(&mut buf, mime.as_bytes());
                    }
                    None => buf.put_u8(0),
                }
            }
            EventPayload::DeleteFile(d) => {
                buf.put_u64(d.deleted_at);
            }
        }

        Ok(buf.freeze())
    }

    /// Decodes canonical payload bytes, rejecting anything malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader(bytes);

        let event_type = EventType::try_from(reader.u8()?)?;
        let filename = reader.string("filename", MAX_FILENAME_LEN)?;
        if filename.is_empty() {
            return Err(DecodeError::Empty("filename"));
        }
        let content_hash = Hash::from_bytes(reader.array::<32>()?);
        let key_material = reader.len_prefixed("encrypted key", MAX_KEY_MATERIAL_LEN)?;

        let payload = match event_type {
            EventType::CreateFile => {
                let size = reader.u64()?;
                let created_at = reader.u64()?;
                let mime_type = match reader.u8()? {
                    0 => None,
                    1 => Some(reader.string("mime type", MAX_MIME_LEN)?),
                    flag => return Err(DecodeError::InvalidFlag(flag)),
                };
                EventPayload::CreateFile(CreateFile {
                    filename,
                    block_hash: content_hash,
                    size,
                    mime_type,
                    created_at,
                    encrypted_key: Bytes::copy_from_slice(key_material),
                })
            }
            EventType::DeleteFile => {
                if content_hash != Hash::ZERO {
                    return Err(DecodeError::NonCanonical("delete carries a content hash"));
                }
                if !key_material.is_empty() {
                    return Err(DecodeError::NonCanonical("delete carries key material"));
                }
                let deleted_at = reader.u64()?;
                EventPayload::DeleteFile(DeleteFile {
                    filename,
                    deleted_at,
                })
            }
        };

        reader.finish()?;
        Ok(payload)
    }

    /// BLAKE3 hash of the canonical bytes: the event's storage key.
    pub fn event_hash(&self) -> VaultResult<Hash> {
        Ok(Hash::new(self.to_bytes()?))
    }
}

fn check_len(field: &'static str, len: usize, max: usize) -> VaultResult<()> {
    if len > max {
        return Err(VaultError::validation(format!(
            "{field} is {len} bytes, limit is {max}"
        )));
    }
    Ok(())
}

fn put_len_prefixed(buf: &mut BytesMut, bytes: &[u8]) {
    // Lengths are bounded by the MAX_* limits, far below u32::MAX.
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Bounds-checked cursor; `bytes::Buf` panics on underflow.
pub(crate) struct Reader<'a>(pub(crate) &'a [u8]);

impl<'a> Reader<'a> {
    fn need(&self, needed: usize) -> Result<(), DecodeError> {
        if self.0.remaining() < needed {
            return Err(DecodeError::InsufficientBytes {
                needed,
                remaining: self.0.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.0.get_u8())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.0.get_u32())
    }

    pub(crate) fn u64(&mut self) -> Result<u64, DecodeError> {
        self.need(8)?;
        Ok(self.0.get_u64())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.0.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.need(len)?;
        let (head, tail) = self.0.split_at(len);
        self.0 = tail;
        Ok(head)
    }

    pub(crate) fn len_prefixed(
        &mut self,
        field: &'static str,
        max: usize,
    ) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        if len > max {
            return Err(DecodeError::LengthOverflow { field, len, max });
        }
        self.take(len)
    }

    fn string(&mut self, field: &'static str, max: usize) -> Result<String, DecodeError> {
        let raw = self.len_prefixed(field, max)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8(field))
    }

    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if !self.0.is_empty() {
            return Err(DecodeError::TrailingBytes(self.0.len()));
        }
        Ok(())
    }
}
