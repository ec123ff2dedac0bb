//! Test utilities for `Store` implementations.
//!
//! A conformance suite that can be run against any `Store` implementation
//! to verify it honours the storage contract the vault depends on.
//!
//! # Usage
//!
//! In your store crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! vault_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use vault_core::testutil::StoreTests;
//!
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     StoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use crate::store::{Store, StoreError, StoreResult};
use bytes::Bytes;
use rand::Rng;

/// Test suite for `Store` implementations.
pub struct StoreTests<'a, S> {
    store: &'a S,
    /// Prefix for test files to avoid conflicts
    prefix: String,
}

impl<'a, S: Store> StoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        let prefix = format!("_test_{}", rand::rng().random::<u32>());
        Self { store, prefix }
    }

    pub fn with_prefix(store: &'a S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_put_get_bytes().await?;
        self.test_empty_object().await?;
        self.test_missing_is_not_found().await?;
        self.test_exists().await?;
        self.test_overwrite().await?;
        self.test_delete_is_idempotent().await?;
        self.test_list().await?;
        self.test_list_missing_dir().await?;
        self.test_create_dir().await?;
        self.test_rejects_traversal().await?;

        self.cleanup().await?;
        Ok(())
    }

    pub async fn test_put_get_bytes(&self) -> StoreResult<()> {
        let path = self.path("bytes_test.bin");
        let data = Bytes::from_static(b"hello, world!");

        self.store.put_bytes(&path, data.clone()).await?;

        let retrieved = self.store.open_read_bytes(&path).await?;
        assert_eq!(retrieved, data, "retrieved data should match original");
        Ok(())
    }

    pub async fn test_empty_object(&self) -> StoreResult<()> {
        let path = self.path("empty.bin");
        self.store.put_bytes(&path, Bytes::new()).await?;
        assert!(self.store.exists(&path).await?);
        assert!(self.store.open_read_bytes(&path).await?.is_empty());
        Ok(())
    }

    pub async fn test_missing_is_not_found(&self) -> StoreResult<()> {
        let path = self.path("never_written.bin");
        match self.store.open_read_bytes(&path).await {
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => panic!("expected NotFound, got {e}"),
            Ok(_) => panic!("expected NotFound, got data"),
        }
    }

    pub async fn test_exists(&self) -> StoreResult<()> {
        let path = self.path("exists_test.bin");

        assert!(
            !self.store.exists(&path).await?,
            "file should not exist before creation"
        );
        self.store
            .put_bytes(&path, Bytes::from_static(b"test"))
            .await?;
        assert!(
            self.store.exists(&path).await?,
            "file should exist after creation"
        );
        Ok(())
    }

    pub async fn test_overwrite(&self) -> StoreResult<()> {
        let path = self.path("overwrite.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"first version, longer"))
            .await?;
        self.store
            .put_bytes(&path, Bytes::from_static(b"second"))
            .await?;
        assert_eq!(
            self.store.open_read_bytes(&path).await?,
            Bytes::from_static(b"second")
        );
        Ok(())
    }

    pub async fn test_delete_is_idempotent(&self) -> StoreResult<()> {
        let path = self.path("delete_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"to be deleted"))
            .await?;
        self.store.delete(&path).await?;
        assert!(!self.store.exists(&path).await?);

        // second delete of an absent object must succeed
        self.store.delete(&path).await?;
        Ok(())
    }

    pub async fn test_list(&self) -> StoreResult<()> {
        let dir = self.path("list_dir");
        let names = ["a.bin", "b.bin", "c.bin"];
        for name in names {
            self.store
                .put_bytes(&format!("{dir}/{name}"), Bytes::from_static(b"x"))
                .await?;
        }
        self.store
            .put_bytes(&format!("{dir}/nested/deep.bin"), Bytes::from_static(b"x"))
            .await?;

        let mut listed = self.store.list(&dir).await?;
        listed.sort();
        assert_eq!(listed, names, "list should return direct children files only");
        Ok(())
    }

    pub async fn test_list_missing_dir(&self) -> StoreResult<()> {
        let listed = self.store.list(&self.path("no_such_dir")).await?;
        assert!(listed.is_empty(), "missing directory should list as empty");
        Ok(())
    }

    pub async fn test_create_dir(&self) -> StoreResult<()> {
        let dir = self.path("made/by/create_dir");
        self.store.create_dir(&dir).await?;
        self.store.create_dir(&dir).await?;
        assert!(self.store.list(&dir).await?.is_empty());
        Ok(())
    }

    pub async fn test_rejects_traversal(&self) -> StoreResult<()> {
        for bad in ["../escape.bin", "/absolute.bin", "a/../../b"] {
            match self.store.put_bytes(bad, Bytes::from_static(b"x")).await {
                Err(StoreError::InvalidPath(_)) => {}
                other => panic!("expected InvalidPath for {bad:?}, got {other:?}"),
            }
        }
        Ok(())
    }

    async fn cleanup(&self) -> StoreResult<()> {
        for name in [
            "bytes_test.bin",
            "empty.bin",
            "exists_test.bin",
            "overwrite.bin",
            "list_dir/a.bin",
            "list_dir/b.bin",
            "list_dir/c.bin",
            "list_dir/nested/deep.bin",
        ] {
            self.store.delete(&self.path(name)).await?;
        }
        Ok(())
    }
}
