//! Error taxonomy shared by every vault crate.
//!
//! Every facade call either returns a complete, verified result or fails
//! with one of these kinds. Nothing is swallowed on the way up.

use crate::store::StoreError;

pub type VaultResult<T> = std::result::Result<T, VaultError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VaultError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: invalid ciphertext or wrong key")]
    Decryption,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Coarse classification of [`VaultError`], stable for front-ends that map
/// errors onto exit codes or HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    KeyDerivation,
    Encryption,
    Decryption,
    Signing,
    Verification,
    NotFound,
    Storage,
    Decode,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) => ErrorKind::Validation,
            VaultError::KeyDerivation(_) => ErrorKind::KeyDerivation,
            VaultError::Encryption => ErrorKind::Encryption,
            VaultError::Decryption => ErrorKind::Decryption,
            VaultError::Signing(_) => ErrorKind::Signing,
            VaultError::Verification(_) => ErrorKind::Verification,
            VaultError::NotFound(_) | VaultError::Storage(StoreError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            VaultError::Storage(_) => ErrorKind::Storage,
            VaultError::Decode(_) => ErrorKind::Decode,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        VaultError::Validation(msg.into())
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        VaultError::Verification(msg.into())
    }
}

/// Malformed bytes: event payloads, envelopes and storage names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("insufficient bytes: needed {needed}, {remaining} remaining")]
    InsufficientBytes { needed: usize, remaining: usize },

    #[error("unknown event type: {0:#04x}")]
    UnknownEventType(u8),

    #[error("{field} length {len} exceeds limit {max}")]
    LengthOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid presence flag: {0}")]
    InvalidFlag(u8),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),

    #[error("empty {0}")]
    Empty(&'static str),

    #[error("invalid hash: {0:?}")]
    InvalidHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_store_not_found() {
        let err = VaultError::from(StoreError::NotFound("blocks/x.bin".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = VaultError::from(StoreError::InvalidPath("../x".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_kind_for_decode() {
        let err = VaultError::from(DecodeError::UnknownEventType(9));
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("0x09"));
    }
}
