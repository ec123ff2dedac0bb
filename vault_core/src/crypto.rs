//! The crypto capability consumed by the vault.
//!
//! Hashing is BLAKE3, signatures are ECDSA over P-256 (RFC 6979 nonces,
//! fixed-width `r || s`), block encryption is
//! XChaCha20-Poly1305 with a random 24-byte nonce prepended to the
//! ciphertext: `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use p256::ecdsa::{
    Signature,
    signature::{Signer, Verifier},
};
use zeroize::Zeroizing;

use crate::{
    Hash,
    error::{VaultError, VaultResult},
    identity::{self, Identity, KdfParams, KeyPair, Secret},
};

pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;
pub const SIGNATURE_SIZE: usize = 64;

const BLOCK_KEY_CONTEXT: &str = "vault/blocks/xchacha20poly1305";

/// 32-byte symmetric block key, zeroed on drop.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; 32]>);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Cryptographic operations the vault is built on.
///
/// Injected into the file service so tests and alternative deployments can
/// swap primitives without touching the replay logic. `derive_keys` must be
/// deterministic; only `encrypt_sym` may consume randomness.
pub trait Crypto: std::fmt::Debug + Send + Sync + 'static {
    fn compute_hash(&self, bytes: &[u8]) -> Hash;

    fn derive_keys(&self, secret: &Secret) -> VaultResult<KeyPair>;

    fn derive_symmetric_key(&self, private_scalar: &[u8; 32]) -> SymmetricKey;

    /// Returns `nonce || ciphertext || tag` under a fresh random nonce.
    fn encrypt_sym(&self, plaintext: &[u8], key: &SymmetricKey) -> VaultResult<Vec<u8>>;

    /// Fails closed: a wrong key or any tampering yields `VaultError::Decryption`.
    fn decrypt_sym(&self, ciphertext: &[u8], key: &SymmetricKey) -> VaultResult<Vec<u8>>;

    fn sign(&self, bytes: &[u8], keys: &KeyPair) -> VaultResult<[u8; SIGNATURE_SIZE]>;

    fn verify(&self, bytes: &[u8], signature: &[u8; SIGNATURE_SIZE], identity: &Identity) -> bool;
}

/// BLAKE3 / Argon2id / P-256 ECDSA / XChaCha20-Poly1305.
#[derive(Debug, Clone, Default)]
pub struct StandardCrypto {
    kdf: KdfParams,
}

impl StandardCrypto {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }
}

impl Crypto for StandardCrypto {
    fn compute_hash(&self, bytes: &[u8]) -> Hash {
        Hash::new(bytes)
    }

    fn derive_keys(&self, secret: &Secret) -> VaultResult<KeyPair> {
        identity::derive_keys(secret, &self.kdf)
    }

    fn derive_symmetric_key(&self, private_scalar: &[u8; 32]) -> SymmetricKey {
        SymmetricKey::from_bytes(blake3::derive_key(BLOCK_KEY_CONTEXT, private_scalar))
    }

    fn encrypt_sym(&self, plaintext: &[u8], key: &SymmetricKey) -> VaultResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(|_| VaultError::Encryption)?;

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::Encryption)?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt_sym(&self, data: &[u8], key: &SymmetricKey) -> VaultResult<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::Decryption);
        }
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Decryption)
    }

    fn sign(&self, bytes: &[u8], keys: &KeyPair) -> VaultResult<[u8; SIGNATURE_SIZE]> {
        let signature: Signature = keys
            .signing_key()?
            .try_sign(bytes)
            .map_err(|e| VaultError::Signing(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }

    fn verify(&self, bytes: &[u8], signature: &[u8; SIGNATURE_SIZE], identity: &Identity) -> bool {
        let Ok(verifying_key) = identity.verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(bytes, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> StandardCrypto {
        StandardCrypto::new(KdfParams::insecure_fast())
    }

    fn keys(secret: &str) -> KeyPair {
        crypto().derive_keys(&Secret::new(secret).unwrap()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let c = crypto();
        let key = c.derive_symmetric_key(keys("correct horse battery").private_scalar());
        for plaintext in [&b""[..], &b"hello"[..], &[0u8, 255, 1, 254, 0][..]] {
            let ct = c.encrypt_sym(plaintext, &key).unwrap();
            assert_eq!(ct.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
            assert_eq!(c.decrypt_sym(&ct, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let c = crypto();
        let key = SymmetricKey::from_bytes([7u8; 32]);
        let a = c.encrypt_sym(b"same", &key).unwrap();
        let b = c.encrypt_sym(b"same", &key).unwrap();
        assert_ne!(a, b);
        assert_ne!(c.compute_hash(&a), c.compute_hash(&b));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let c = crypto();
        let ct = c
            .encrypt_sym(b"secret data", &SymmetricKey::from_bytes([1u8; 32]))
            .unwrap();
        let err = c
            .decrypt_sym(&ct, &SymmetricKey::from_bytes([2u8; 32]))
            .unwrap_err();
        assert!(matches!(err, VaultError::Decryption));
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let c = crypto();
        let key = SymmetricKey::from_bytes([1u8; 32]);
        let ct = c.encrypt_sym(b"secret data", &key).unwrap();
        for i in [0, NONCE_SIZE, ct.len() - 1] {
            let mut tampered = ct.clone();
            tampered[i] ^= 0x01;
            assert!(matches!(
                c.decrypt_sym(&tampered, &key),
                Err(VaultError::Decryption)
            ));
        }
        assert!(matches!(
            c.decrypt_sym(&ct[..NONCE_SIZE + TAG_SIZE - 1], &key),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_sign_verify() {
        let c = crypto();
        let k = keys("correct horse battery");
        let other = keys("another secret!");
        let sig = c.sign(b"payload", &k).unwrap();
        assert!(c.verify(b"payload", &sig, &k.identity()));
        assert!(!c.verify(b"payloae", &sig, &k.identity()));
        assert!(!c.verify(b"payload", &sig, &other.identity()));

        let mut bad = sig;
        bad[10] ^= 0x80;
        assert!(!c.verify(b"payload", &bad, &k.identity()));

        // r = 0 is not a valid signature encoding
        assert!(!c.verify(b"payload", &[0u8; SIGNATURE_SIZE], &k.identity()));
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let c = crypto();
        let k = keys("correct horse battery");
        assert_eq!(c.sign(b"payload", &k).unwrap(), c.sign(b"payload", &k).unwrap());
    }

    #[test]
    fn test_symmetric_key_differs_per_identity() {
        let c = crypto();
        let a = c.derive_symmetric_key(keys("correct horse battery").private_scalar());
        let b = c.derive_symmetric_key(keys("another secret!").private_scalar());
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), keys("correct horse battery").private_scalar());
    }
}
