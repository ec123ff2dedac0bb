//! Core vault protocol types and traits.
//!
//! This crate defines the shared types and traits used by all vault crates.
//!
//! ## Protocol types (wire-stable)
//!
//! The following modules define formats that are hashed, signed and
//! persisted; changes to them are protocol changes because every reader must
//! compute byte-identical results:
//!
//! - Content hashes (`hash::Hash`)
//! - Identity derivation constants (`identity`)
//! - Canonical event payloads and the signed event envelope (`event`)
//!
//! ## Convenience APIs (non-wire)
//!
//! - Storage abstraction (`Store`) and the `BlobStore` facade
//! - The crypto capability (`Crypto`, `StandardCrypto`)
//! - The error taxonomy (`VaultError`, `ErrorKind`)

pub mod blob;
pub mod crypto;
pub mod error;
pub mod event;
pub mod hash;
pub mod identity;
pub mod store;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

// --- Core Public Surface ---

pub use blob::BlobStore;
pub use crypto::{Crypto, StandardCrypto, SymmetricKey};
pub use error::{DecodeError, ErrorKind, VaultError, VaultResult};
pub use event::{EventPayload, SignedEvent};
pub use hash::Hash;
pub use identity::{Identity, KdfParams, KeyPair, Secret};
pub use store::{Store, StoreError, StoreResult};
