//! Secret handling and deterministic identity derivation.
//!
//! ## Key Derivation Chain
//!
//! ```text
//! secret (>= 8 chars, never persisted)
//!     |
//!     v
//! Argon2id(secret, IDENTITY_SALT, KdfParams) -> seed [32 bytes]
//!     |
//!     v
//! blake3 derive_key("vault/identity/p256", seed || counter) -> private_scalar
//!     |   (counter starts at 0 and is bumped while the value is 0 or >= n)
//!     |
//!     +-> P-256 base-point multiplication -> public_key, 65-byte SEC1 uncompressed
//!     |       |
//!     |       +-> hex(public_key) -> storage namespace (130 chars)
//!     |
//!     +-- blake3::derive_key("vault/blocks/xchacha20poly1305", private_scalar)
//!             -> block encryption key
//! ```
//!
//! Every step is a pure function of the secret and the fixed protocol
//! constants below; no randomness enters the chain.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use p256::{
    FieldBytes, SecretKey,
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{VaultError, VaultResult};

/// Minimum secret length, counted in characters.
pub const MIN_SECRET_CHARS: usize = 8;

/// Argon2id salt. Fixed: the same secret must yield the same identity everywhere.
pub const IDENTITY_SALT: &[u8] = b"vault/identity/argon2id/v1";

const SCALAR_CONTEXT: &str = "vault/identity/p256";

/// Attempts before giving up on finding a valid scalar. Each attempt fails
/// with probability below 2^-32.
const MAX_SCALAR_ATTEMPTS: u32 = 16;

/// Size of an uncompressed SEC1 P-256 public key: `0x04 || x || y`.
pub const PUBLIC_KEY_SIZE: usize = 65;

/// A user secret. Zeroed on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps `secret`, rejecting anything shorter than [`MIN_SECRET_CHARS`].
    pub fn new(secret: impl Into<String>) -> VaultResult<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.chars().count() < MIN_SECRET_CHARS {
            return Err(VaultError::validation(format!(
                "secret must be at least {MIN_SECRET_CHARS} characters"
            )));
        }
        Ok(Self(secret))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Argon2id cost parameters. Part of the protocol: changing them changes
/// every identity derived under them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests and throwaway volumes. Not for real secrets.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// P-256 key pair derived from a secret.
///
/// `private_scalar` is the big-endian secret scalar in `[1, n)`; `public_key`
/// is always computed from it by base-point multiplication.
#[derive(Clone)]
pub struct KeyPair {
    private_scalar: [u8; 32],
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyPair {
    /// Fails if `private_scalar` is zero or not below the curve order.
    pub fn from_private_scalar(private_scalar: [u8; 32]) -> VaultResult<Self> {
        let secret_key = SecretKey::from_bytes(&FieldBytes::from(private_scalar))
            .map_err(|_| VaultError::KeyDerivation("scalar out of range".into()))?;
        let point = secret_key.public_key().to_encoded_point(false);
        let public_key = point
            .as_bytes()
            .try_into()
            .map_err(|_| VaultError::KeyDerivation("unexpected public key encoding".into()))?;
        Ok(Self {
            private_scalar,
            public_key,
        })
    }

    pub fn private_scalar(&self) -> &[u8; 32] {
        &self.private_scalar
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    pub fn signing_key(&self) -> VaultResult<SigningKey> {
        SigningKey::from_bytes(&FieldBytes::from(self.private_scalar))
            .map_err(|e| VaultError::Signing(e.to_string()))
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.public_key)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private_scalar.zeroize();
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// The public half of a key pair plus the storage namespace derived from it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    #[serde(serialize_with = "hex::serde::serialize")]
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl Identity {
    pub fn new(public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self { public_key }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Storage directory holding this identity's event log.
    pub fn namespace(&self) -> String {
        self.public_key_hex()
    }

    pub fn verifying_key(&self) -> VaultResult<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| VaultError::verification(format!("invalid public key: {e}")))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.public_key_hex()).finish()
    }
}

/// Derives the key pair for `secret` under `params`.
pub fn derive_keys(secret: &Secret, params: &KdfParams) -> VaultResult<KeyPair> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| VaultError::KeyDerivation(format!("invalid argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut seed = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(secret.expose().as_bytes(), IDENTITY_SALT, &mut seed[..])
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    for counter in 0..MAX_SCALAR_ATTEMPTS {
        let scalar = Zeroizing::new(
            *blake3::Hasher::new_derive_key(SCALAR_CONTEXT)
                .update(&seed[..])
                .update(&counter.to_be_bytes())
                .finalize()
                .as_bytes(),
        );
        if let Ok(keys) = KeyPair::from_private_scalar(*scalar) {
            return Ok(keys);
        }
    }
    Err(VaultError::KeyDerivation(
        "no valid scalar within the attempt limit".into(),
    ))
}
