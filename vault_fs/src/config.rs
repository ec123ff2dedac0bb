use std::{path::Path, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vault_core::{KdfParams, StandardCrypto, Store};
use vault_store_local::{LocalStore, LocalStoreConfig};
use vault_store_memory::MemoryStore;

use crate::{clock::SystemClock, service::VaultService};

/// Deployment configuration, usually read from a TOML file:
///
/// ```toml
/// [store]
/// type = "local"
/// base_path = "/mnt/shared/vault"
///
/// [kdf]
/// memory_kib = 19456
/// iterations = 2
/// parallelism = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub kdf: KdfParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Local(LocalStoreConfig),
    Memory,
}

impl StoreConfig {
    pub fn build(&self) -> Arc<dyn Store> {
        match self {
            StoreConfig::Local(config) => Arc::new(LocalStore::create(config.clone())),
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
        }
    }
}

impl VaultConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid vault config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Wires a service with the standard crypto and the system clock.
    pub fn build_service(&self) -> VaultService {
        tracing::debug!("config: building service over {:?}", self.store);
        VaultService::new(
            Arc::new(StandardCrypto::new(self.kdf)),
            self.store.build(),
            Arc::new(SystemClock),
        )
    }
}
