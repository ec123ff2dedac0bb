//! Properties of the vault that must hold regardless of how the log was written.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use vault_core::{
    BlobStore, ErrorKind, KdfParams, StandardCrypto, Store, StoreError, StoreResult,
};
use vault_fs::{MAX_CONCURRENT_READS, ManualClock, VaultService};
use vault_store_local::LocalStore;
use vault_store_memory::MemoryStore;

const SECRET: &str = "properties test secret";

fn service_over(store: Arc<dyn Store>, clock: Arc<ManualClock>) -> VaultService {
    VaultService::new(
        Arc::new(StandardCrypto::new(KdfParams::insecure_fast())),
        store,
        clock,
    )
}

fn memory_service() -> (VaultService, MemoryStore, Arc<ManualClock>) {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(1_000));
    (
        service_over(Arc::new(store.clone()), clock.clone()),
        store,
        clock,
    )
}

#[tokio::test]
async fn replay_is_pure_across_services() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(5_000));
    let writer = service_over(Arc::new(LocalStore::new(dir.path())), clock.clone());

    for i in 0..10u8 {
        let name = format!("file-{}.dat", i % 4);
        writer.add_file(SECRET, &name, vec![i; 100], None).await.unwrap();
        if i % 3 == 0 {
            writer.delete_file(SECRET, &name).await.unwrap();
        }
        clock.advance(u64::from(i % 2));
    }

    let reader = service_over(
        Arc::new(LocalStore::new(dir.path())),
        Arc::new(ManualClock::new(0)),
    );
    let expected = writer.list_files(SECRET).await.unwrap();
    for _ in 0..3 {
        assert_eq!(reader.list_files(SECRET).await.unwrap(), expected);
    }
    assert_eq!(
        writer.history(SECRET).await.unwrap(),
        reader.history(SECRET).await.unwrap()
    );
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (vault, _, clock) = memory_service();
    vault.add_file(SECRET, "a.txt", &b"a"[..], None).await.unwrap();
    vault.add_file(SECRET, "b.txt", &b"b"[..], None).await.unwrap();
    clock.advance(1);

    vault.delete_file(SECRET, "a.txt").await.unwrap();
    let once = vault.list_files(SECRET).await.unwrap();
    clock.advance(1);
    vault.delete_file(SECRET, "a.txt").await.unwrap();
    vault.delete_file(SECRET, "never-added.txt").await.unwrap();

    assert_eq!(vault.list_files(SECRET).await.unwrap(), once);
    assert_eq!(once.len(), 1);
}

#[tokio::test]
async fn content_round_trips() {
    let (vault, _, clock) = memory_service();
    let binary: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("empty.bin", Vec::new()),
        ("binary.bin", binary),
        ("unicode-名前.txt", "héllo wörld".as_bytes().to_vec()),
    ];

    for (name, content) in &cases {
        let meta = vault
            .add_file(SECRET, name, content.clone(), Some("application/octet-stream"))
            .await
            .unwrap();
        assert_eq!(meta.size, content.len() as u64);
        assert_eq!(
            vault.get_file(SECRET, meta.block_hash).await.unwrap(),
            Bytes::from(content.clone())
        );
        clock.advance(1);
    }

    for (name, content) in &cases {
        assert_eq!(
            vault.get_file_by_name(SECRET, name).await.unwrap(),
            Bytes::from(content.clone())
        );
    }
}

#[tokio::test]
async fn same_plaintext_twice_gives_two_blocks() {
    let (vault, store, _) = memory_service();
    let blobs = BlobStore::new(store.clone());

    let first = vault.add_file(SECRET, "a.txt", &b"same"[..], None).await.unwrap();
    let second = vault.add_file(SECRET, "b.txt", &b"same"[..], None).await.unwrap();
    assert_ne!(first.block_hash, second.block_hash);

    let mut stored = blobs.list_hashes().await.unwrap();
    stored.sort();
    let mut expected = vec![first.block_hash, second.block_hash];
    expected.sort();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn identical_ciphertext_is_stored_once() {
    let store = MemoryStore::new();
    let blobs = BlobStore::new(store.clone());
    let ciphertext = Bytes::from_static(b"opaque ciphertext");

    let a = blobs.store_block(ciphertext.clone(), true).await.unwrap();
    let b = blobs.store_block(ciphertext, true).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(blobs.list_hashes().await.unwrap(), vec![a]);
}

#[tokio::test]
async fn tampered_event_fails_whole_listing() {
    let (vault, store, clock) = memory_service();
    vault.add_file(SECRET, "a.txt", &b"a"[..], None).await.unwrap();
    clock.advance(1);
    vault.add_file(SECRET, "b.txt", &b"b"[..], None).await.unwrap();

    let namespace = vault.open(SECRET).await.unwrap().public_key;
    let victim = format!("{namespace}/{}", store.list(&namespace).await.unwrap()[0]);
    let mut bytes = store.open_read_bytes(&victim).await.unwrap().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    store.put_bytes(&victim, Bytes::from(bytes)).await.unwrap();

    let err = vault.list_files(SECRET).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert!(vault.open(SECRET).await.is_err());
    assert!(vault.history(SECRET).await.is_err());
}

#[tokio::test]
async fn tampered_block_fails_closed() {
    let (vault, store, _) = memory_service();
    let meta = vault.add_file(SECRET, "a.txt", &b"secret data"[..], None).await.unwrap();

    // Re-store a modified ciphertext under the original address.
    let path = BlobStore::block_path_for_hash(meta.block_hash);
    let mut bytes = store.open_read_bytes(&path).await.unwrap().to_vec();
    bytes[30] ^= 0x80;
    store.put_bytes(&path, Bytes::from(bytes)).await.unwrap();

    let err = vault.get_file(SECRET, meta.block_hash).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);
    let err = vault.get_file_by_name(SECRET, "a.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);

    // the integrity report still classifies it as corrupt
    let report = vault.verify(SECRET).await.unwrap();
    assert_eq!(report.corrupt_blocks, vec![meta]);
}

#[tokio::test]
async fn truncated_block_fails_closed() {
    let (vault, store, _) = memory_service();
    let meta = vault.add_file(SECRET, "a.txt", &b"secret data"[..], None).await.unwrap();

    let path = BlobStore::block_path_for_hash(meta.block_hash);
    let bytes = store.open_read_bytes(&path).await.unwrap();
    store.put_bytes(&path, bytes.slice(..10)).await.unwrap();

    let err = vault.get_file(SECRET, meta.block_hash).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);
}

#[tokio::test]
async fn validation_happens_before_io() {
    let counting = Arc::new(CountingStore::default());
    let vault = service_over(counting.clone(), Arc::new(ManualClock::new(0)));

    for bad in ["", "   ", "\t\n"] {
        let err = vault.add_file(SECRET, bad, &b"x"[..], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = vault.delete_file(SECRET, bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let err = vault
        .add_file(SECRET, "a.txt", &b"x"[..], Some("m".repeat(256).as_str()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = vault.list_files("short").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_read_aborts_whole_replay() {
    let flaky = Arc::new(FlakyStore::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let vault = service_over(flaky.clone(), clock.clone());

    for name in ["a.txt", "b.txt", "c.txt"] {
        vault.add_file(SECRET, name, &b"data"[..], None).await.unwrap();
        clock.advance(1);
    }
    let namespace = vault.open(SECRET).await.unwrap().public_key;
    let victim = format!("{namespace}/{}", flaky.inner.list(&namespace).await.unwrap()[1]);
    *flaky.fail_reads_of.lock().unwrap() = Some(victim);

    let err = vault.list_files(SECRET).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    *flaky.fail_reads_of.lock().unwrap() = None;
    assert_eq!(vault.list_files(SECRET).await.unwrap().len(), 3);
}

#[tokio::test]
async fn concurrent_writers_converge() {
    let (vault, _, _) = memory_service();
    let tasks: Vec<_> = (0..8u8)
        .map(|i| {
            let vault = vault.clone();
            tokio::spawn(async move {
                vault
                    .add_file(SECRET, "race.txt", vec![i; 8], None)
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // all writes share one millisecond; the winner is decided by block hash
    let files = vault.list_files(SECRET).await.unwrap();
    assert_eq!(files.len(), 1);
    let history = vault.history(SECRET).await.unwrap();
    assert_eq!(history.len(), 8);
    let last = history.last().unwrap();
    assert_eq!(last.event.payload.filename(), "race.txt");
    assert_eq!(
        vault.get_file_by_name(SECRET, "race.txt").await.unwrap().len(),
        8
    );
}

#[tokio::test]
async fn replay_bounds_reads_in_flight() {
    let store = Arc::new(PeakReadStore::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let vault = service_over(store.clone(), clock.clone());

    let events = MAX_CONCURRENT_READS * 2 + 16;
    for i in 0..events {
        vault.delete_file(SECRET, &format!("f{i}")).await.unwrap();
        clock.advance(1);
    }

    assert_eq!(vault.history(SECRET).await.unwrap().len(), events);
    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= MAX_CONCURRENT_READS, "peak {peak}");
    assert!(peak > 1, "reads were never overlapped");
}

/// Counts every storage call.
#[derive(Debug, Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.hit();
        self.inner.put_bytes(path, bytes).await
    }

    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        self.hit();
        self.inner.open_read_bytes(path).await
    }

    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        self.hit();
        self.inner.list(dir).await
    }

    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        self.hit();
        self.inner.create_dir(path).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.hit();
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.hit();
        self.inner.delete(path).await
    }
}

/// Fails reads of one chosen path.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_reads_of: Mutex<Option<String>>,
}

#[async_trait]
impl Store for FlakyStore {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.inner.put_bytes(path, bytes).await
    }

    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        let fail = self.fail_reads_of.lock().unwrap().as_deref() == Some(path);
        if fail {
            return Err(StoreError::Other(anyhow::anyhow!("injected read failure")));
        }
        self.inner.open_read_bytes(path).await
    }

    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        self.inner.list(dir).await
    }

    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        self.inner.create_dir(path).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.inner.delete(path).await
    }
}

/// Records the highest number of reads in flight at once.
#[derive(Debug, Default)]
struct PeakReadStore {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Store for PeakReadStore {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.inner.put_bytes(path, bytes).await
    }

    async fn open_read_bytes(&self, path: &str) -> StoreResult<Bytes> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = self.inner.open_read_bytes(path).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list(&self, dir: &str) -> StoreResult<Vec<String>> {
        self.inner.list(dir).await
    }

    async fn create_dir(&self, path: &str) -> StoreResult<()> {
        self.inner.create_dir(path).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.inner.delete(path).await
    }
}
