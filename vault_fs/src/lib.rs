//! # Vault file operations
//!
//! Mutable file state derived from an immutable, signed, content-addressed
//! substrate. There is no index and no mutable metadata record: every call
//! re-derives the identity from the secret and replays that identity's event
//! log from storage.
//!
//! ## Layers
//! 1. `log`     – append-only signed event log under `<namespace>/`.
//! 2. `replay`  – load, verify, order and fold events into a [`FileSystemState`].
//! 3. `service` – the [`VaultService`] facade applications call.
//! 4. `config`  – TOML wiring for stores and key-derivation parameters.
//! 5. `clock`   – the time source stamped into events.

pub mod clock;
pub mod config;
pub mod log;
pub mod replay;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, VaultConfig};
pub use log::EventLog;
pub use replay::{FileMetadata, FileSystemState, LogEntry, MAX_CONCURRENT_READS};
pub use service::{IntegrityReport, VaultService, Volume};
