//! Failure injection for the tiered store and reconciler.
//!
//! 1. **FailingBackend wrapper** - precise error injection at specific call counts
//! 2. **GatedBackend wrapper** - holds a save open to interleave foreground writes
//! 3. **Capacity limits** - slow tier quota exhaustion
//! 4. **Data corruption** - garbage files and tampered backups
//!
//! # Running
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use task_sync_engine::entity::{Entity, Task};
use task_sync_engine::{
    DeletionPolicy, MemoryBackend, Reconciler, StorageBackend, StorageError, StoragePriority,
    StorageStrategy, StoreConfig, SyncError, TieredStore,
};

// =============================================================================
// Failing Backend Wrapper - Precise Error Injection
// =============================================================================

/// Injects failures into one operation kind at specific call counts.
pub struct FailingBackend<S: StorageBackend> {
    inner: S,
    /// Operation to fail: "save", "load" or "delete"
    op: &'static str,
    calls: AtomicU64,
    /// Fail on these call numbers (1-indexed, counted for `op` only)
    fail_on_calls: Vec<u64>,
}

impl<S: StorageBackend> FailingBackend<S> {
    pub fn new(inner: S, op: &'static str, fail_on_calls: Vec<u64>) -> Self {
        Self {
            inner,
            op,
            calls: AtomicU64::new(0),
            fail_on_calls,
        }
    }

    fn maybe_fail(&self, op: &'static str) -> Result<(), StorageError> {
        if op != self.op {
            return Ok(());
        }
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.fail_on_calls.contains(&count) {
            return Ok(());
        }
        let msg = format!("injected {op} failure on call {count}");
        Err(match op {
            "save" => StorageError::SaveFailed(msg),
            "delete" => StorageError::DeleteFailed(msg),
            _ => StorageError::LoadFailed(msg),
        })
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for FailingBackend<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.maybe_fail("save")?;
        self.inner.save(key, value).await
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.maybe_fail("load")?;
        self.inner.load(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.maybe_fail("delete")?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.inner.list_keys(prefix).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await
    }

    async fn backup(&self) -> Result<Vec<u8>, StorageError> {
        self.inner.backup().await
    }

    async fn restore(&self, archive: &[u8]) -> Result<(), StorageError> {
        self.inner.restore(archive).await
    }

    async fn storage_size_bytes(&self) -> Result<u64, StorageError> {
        self.inner.storage_size_bytes().await
    }
}

// =============================================================================
// Gated Backend Wrapper - Interleaving
// =============================================================================

/// Blocks the first `save` after [`arm`](Self::arm) until [`open`](Self::open).
pub struct GatedBackend<S: StorageBackend> {
    inner: S,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl<S: StorageBackend> GatedBackend<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the gated save is parked.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for GatedBackend<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.save(key, value).await
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.inner.list_keys(prefix).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await
    }

    async fn backup(&self) -> Result<Vec<u8>, StorageError> {
        self.inner.backup().await
    }

    async fn restore(&self, archive: &[u8]) -> Result<(), StorageError> {
        self.inner.restore(archive).await
    }

    async fn storage_size_bytes(&self) -> Result<u64, StorageError> {
        self.inner.storage_size_bytes().await
    }
}

fn store_with(
    config: StoreConfig,
    fast: Arc<dyn StorageBackend>,
    slow: Arc<dyn StorageBackend>,
) -> Arc<TieredStore> {
    Arc::new(TieredStore::with_backends(config, fast, slow))
}

// =============================================================================
// Backend failures
// =============================================================================

#[tokio::test]
async fn failed_save_propagates_and_skips_cache() {
    let fast = Arc::new(FailingBackend::new(MemoryBackend::new(), "save", vec![1]));
    let store = store_with(StoreConfig::default(), fast, Arc::new(MemoryBackend::new()));
    let task = Task::new("doomed");

    let err = store
        .save(&task.storage_key(), &task, StoragePriority::Normal)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::SaveFailed(msg) if msg.contains("call 1")));
    assert!(!store.cache().exists(&task.storage_key()));
    assert!(store.load::<Task>(&task.storage_key()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_failure_still_invalidates_cache() {
    // Call 1 is the stale-copy cleanup during save, call 2 the real delete
    let slow = Arc::new(FailingBackend::new(MemoryBackend::new(), "delete", vec![2]));
    let store = store_with(StoreConfig::default(), Arc::new(MemoryBackend::new()), slow);
    let task = store.create(Task::new("x")).await.unwrap();
    let key = task.storage_key();
    assert!(store.cache().exists(&key));

    let err = store.delete(&key).await.unwrap_err();

    assert!(matches!(err, StorageError::DeleteFailed(_)));
    assert!(!store.cache().exists(&key));
}

#[tokio::test]
async fn rebalance_skips_failing_keys_and_finishes_sweep() {
    let fast = Arc::new(MemoryBackend::new());
    let slow = Arc::new(FailingBackend::new(MemoryBackend::new(), "save", vec![1]));
    let config = StoreConfig {
        fast_tier_quota_bytes: 10,
        ..Default::default()
    };
    let store = store_with(config, fast.clone(), slow.clone());

    for title in ["a", "b", "c"] {
        store.create(Task::new(title)).await.unwrap();
    }

    let report = store.rebalance().await.unwrap();

    assert!(report.triggered);
    assert_eq!(report.migrated, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(fast.len(), 1);
    assert_eq!(slow.list_keys(None).await.unwrap().len(), 2);

    // Every record is still readable from one tier or the other
    assert_eq!(store.list::<Task>().await.unwrap().len(), 3);
}

#[tokio::test]
async fn failed_stale_copy_cleanup_writes_nothing() {
    // Small values route to fast; the slow-tier cleanup runs first and fails
    let slow = Arc::new(FailingBackend::new(MemoryBackend::new(), "delete", vec![1]));
    let store = store_with(StoreConfig::default(), Arc::new(MemoryBackend::new()), slow);
    let task = Task::new("never stored");

    let err = store.create(task.clone()).await.unwrap_err();

    assert!(matches!(err, StorageError::DeleteFailed(_)));
    assert!(!store.cache().exists(&task.storage_key()));
    assert!(store.get::<Task>(task.id()).await.unwrap().is_none());
    assert!(store.list_keys(None).await.unwrap().is_empty());
}

// =============================================================================
// Interleaving with background rebalance
// =============================================================================

#[tokio::test]
async fn update_during_rebalance_is_not_lost() {
    let slow = Arc::new(GatedBackend::new(MemoryBackend::new()));
    let config = StoreConfig {
        fast_tier_quota_bytes: 10,
        ..Default::default()
    };
    let store = store_with(config, Arc::new(MemoryBackend::new()), slow.clone());
    let v1 = store.create(Task::new("v1")).await.unwrap();

    slow.arm();
    let rebalance = tokio::spawn({
        let store = store.clone();
        async move { store.rebalance().await }
    });
    slow.wait_entered().await;

    let update = tokio::spawn({
        let store = store.clone();
        let mut edit = v1.clone();
        edit.title = "v2".into();
        async move { store.update(edit).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    slow.open();

    rebalance.await.unwrap().unwrap();
    let committed = update.await.unwrap().unwrap();
    assert_eq!(committed.meta.version, 2);

    store.cache().clear();
    let loaded = store.get::<Task>(v1.id()).await.unwrap().unwrap();
    assert_eq!(loaded.title, "v2");
    assert_eq!(loaded.meta.version, 2);
    assert_eq!(store.list_keys(None).await.unwrap().len(), 1);
}

// =============================================================================
// Partial convergence
// =============================================================================

#[tokio::test]
async fn reconcile_failure_keeps_applied_changes_and_next_pass_converges() {
    let fast = Arc::new(FailingBackend::new(MemoryBackend::new(), "save", vec![2]));
    let store = store_with(StoreConfig::default(), fast, Arc::new(MemoryBackend::new()));
    let reconciler = Reconciler::new(store.clone());
    let remote = vec![Task::new("one"), Task::new("two"), Task::new("three")];

    let err = reconciler
        .reconcile(&[], &remote, &DeletionPolicy::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Storage(StorageError::SaveFailed(_))));

    let local = store.list::<Task>().await.unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].title, "one");

    let report = reconciler
        .reconcile(&local, &remote, &DeletionPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(store.list::<Task>().await.unwrap().len(), 3);
}

// =============================================================================
// Capacity and corruption
// =============================================================================

#[tokio::test]
async fn slow_tier_quota_rejects_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = TieredStore::open(StoreConfig {
        strategy: StorageStrategy::SlowOnly,
        slow_tier_dir: dir.path().to_path_buf(),
        slow_tier_max_bytes: Some(64),
        ..Default::default()
    })
    .await
    .unwrap();

    let err = store.create(Task::new("too big")).await.unwrap_err();
    assert_eq!(err, StorageError::InsufficientSpace);
    assert!(store.list_keys(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn garbage_file_is_a_decoding_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("task_garbage.json"), b"{ not json").unwrap();

    let store = TieredStore::open(StoreConfig {
        slow_tier_dir: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let err = store.load::<Task>("task_garbage").await.unwrap_err();
    assert!(matches!(err, StorageError::DecodingFailed(_)));
}

#[tokio::test]
async fn tampered_backup_is_rejected_before_any_tier_changes() {
    let store = store_with(
        StoreConfig::default(),
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
    );
    let task = store.create(Task::new("original")).await.unwrap();
    let backup = store.backup().await.unwrap();

    let tampered = String::from_utf8(backup)
        .unwrap()
        .replace("original", "tampered");
    store.clear().await.unwrap();
    let survivor = store.create(Task::new("survivor")).await.unwrap();

    let err = store.restore(tampered.as_bytes()).await.unwrap_err();

    assert!(matches!(err, StorageError::RestoreFailed(_)));
    assert!(store.get::<Task>(survivor.id()).await.unwrap().is_some());
    assert!(store.get::<Task>(task.id()).await.unwrap().is_none());
}
