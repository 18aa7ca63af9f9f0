// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered entity store.
//!
//! The single entry point for keyed reads and writes. It combines the record
//! cache with a fast and a slow backend:
//!
//! ```text
//!            save                         load
//!             │                            │
//!      encode + route                  ┌───▼───┐  hit
//!    ┌────────┴────────┐               │ cache ├──────► value
//!    ▼                 ▼               └───┬───┘
//! ┌──────┐  ≤ 1 KiB  ┌──────┐    miss      ▼
//! │ fast │  or high  │ slow │          fast → slow
//! └──────┘           └──────┘              │ first hit
//!    └────── cache.set ◄────────── cache.set
//! ```
//!
//! # Strategies
//!
//! | strategy    | writes                         | reads / exists        |
//! |-------------|--------------------------------|-----------------------|
//! | `FastOnly`  | fast                           | cache, fast           |
//! | `SlowOnly`  | slow                           | cache, slow           |
//! | `Hybrid`    | fast if high priority or small | cache, fast, slow     |
//!
//! A write removes any copy of the key from the other tier, so exactly one
//! backend holds a given key and a strategy switch never surfaces an older
//! value. Deletes always hit both tiers and always invalidate the cache.
//!
//! # Example
//!
//! ```no_run
//! use task_sync_engine::{StoreConfig, TieredStore, StoragePriority};
//! use task_sync_engine::entity::{Entity, Task};
//!
//! # async fn example() -> Result<(), task_sync_engine::StorageError> {
//! let store = TieredStore::open(StoreConfig::default()).await?;
//!
//! let task = store.create(Task::new("Plan sprint")).await?;
//! let loaded: Option<Task> = store.load(&task.storage_key()).await?;
//! assert_eq!(loaded.unwrap().title, "Plan sprint");
//! # Ok(())
//! # }
//! ```

mod maintenance;
mod records;
mod types;

pub use types::{OptimizeReport, RebalanceReport, StorageInfo, StoragePriority, StorageUsage, Tier};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::cache::Cache;
use crate::config::{StorageStrategy, StoreConfig};
use crate::entity::{Entity, Record};
use crate::metrics;
use crate::storage::{codec, BackupArchive, FileBackend, MemoryBackend, StorageBackend, StorageError};

use maintenance::MaintenanceHandle;
use types::{TieredBackup, TIERED_BACKUP_VERSION};

/// Number of key lock stripes serializing writes and migrations per key.
const KEY_LOCK_STRIPES: usize = 64;

pub struct TieredStore {
    config: StoreConfig,
    strategy: RwLock<StorageStrategy>,
    cache: Arc<Cache<Record>>,
    fast: Arc<dyn StorageBackend>,
    slow: Arc<dyn StorageBackend>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
    key_locks: Box<[AsyncMutex<()>]>,
}

/// Record metrics for one backend call.
fn observe<T>(tier: &str, operation: &str, started: Instant, result: &Result<T, StorageError>) {
    metrics::record_latency(tier, operation, started.elapsed());
    match result {
        Ok(_) => metrics::record_operation(tier, operation, "success"),
        Err(e) => {
            metrics::record_operation(tier, operation, "error");
            metrics::record_error(tier, operation, e.kind());
        }
    }
}

impl TieredStore {
    /// Open the store described by `config`: an in-memory fast tier and a
    /// file tier under `slow_tier_dir` (created if absent).
    pub async fn open(config: StoreConfig) -> Result<Self, StorageError> {
        let slow = FileBackend::with_max_bytes(&config.slow_tier_dir, config.slow_tier_max_bytes).await?;
        Ok(Self::with_backends(
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(slow),
        ))
    }

    /// Assemble a store from explicit backends.
    #[must_use]
    pub fn with_backends(
        config: StoreConfig,
        fast: Arc<dyn StorageBackend>,
        slow: Arc<dyn StorageBackend>,
    ) -> Self {
        info!(
            strategy = %config.strategy,
            fast = fast.name(),
            slow = slow.name(),
            "Tiered store ready"
        );
        Self {
            strategy: RwLock::new(config.strategy),
            cache: Arc::new(Cache::new(config.cache_config())),
            fast,
            slow,
            maintenance: Mutex::new(None),
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| AsyncMutex::new(())).collect(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<Cache<Record>> {
        &self.cache
    }

    #[must_use]
    pub fn strategy(&self) -> StorageStrategy {
        *self.strategy.read()
    }

    /// Switch strategy at runtime. Existing keys stay where they are.
    pub fn set_strategy(&self, strategy: StorageStrategy) {
        let previous = std::mem::replace(&mut *self.strategy.write(), strategy);
        if previous != strategy {
            info!(from = %previous, to = %strategy, "Storage strategy changed");
        }
    }

    /// Held across every backend mutation of `key`. Not reentrant.
    async fn lock_key(&self, key: &str) -> AsyncMutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = (hasher.finish() % KEY_LOCK_STRIPES as u64) as usize;
        self.key_locks[stripe].lock().await
    }

    fn backend(&self, tier: Tier) -> &Arc<dyn StorageBackend> {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Slow => &self.slow,
        }
    }

    /// Tier a write of `size` bytes goes to under the current strategy.
    #[must_use]
    pub fn route(&self, size: usize, priority: StoragePriority) -> Tier {
        match self.strategy() {
            StorageStrategy::FastOnly => Tier::Fast,
            StorageStrategy::SlowOnly => Tier::Slow,
            StorageStrategy::Hybrid => {
                if priority == StoragePriority::High || size <= self.config.small_value_threshold_bytes {
                    Tier::Fast
                } else {
                    Tier::Slow
                }
            }
        }
    }

    /// Tiers consulted on read, in order.
    fn read_order(&self) -> &'static [Tier] {
        match self.strategy() {
            StorageStrategy::FastOnly => &[Tier::Fast],
            StorageStrategy::SlowOnly => &[Tier::Slow],
            StorageStrategy::Hybrid => &[Tier::Fast, Tier::Slow],
        }
    }

    /// Persist `value` under `key` and refresh the cache.
    ///
    /// The other tier's copy is removed first, so an error leaves the new
    /// value unwritten. If the tier write itself fails after that removal,
    /// the key is gone from both tiers and the cache.
    #[instrument(skip(self, value), fields(tier = tracing::field::Empty))]
    pub async fn save<E: Entity>(
        &self,
        key: &str,
        value: &E,
        priority: StoragePriority,
    ) -> Result<Tier, StorageError> {
        let bytes = codec::encode(value)?;
        let tier = self.route(bytes.len(), priority);
        tracing::Span::current().record("tier", tier.as_str());
        debug!(size = bytes.len(), ?priority, "Routed write");
        let other = match tier {
            Tier::Fast => Tier::Slow,
            Tier::Slow => Tier::Fast,
        };
        let _key = self.lock_key(key).await;

        let started = Instant::now();
        let result = self.backend(other).delete(key).await;
        observe(other.as_str(), "delete", started, &result);
        let had_stale = result?;
        if had_stale {
            debug!(key, from = other.as_str(), "Removed stale copy from other tier");
        }

        let started = Instant::now();
        let result = self.backend(tier).save(key, &bytes).await;
        observe(tier.as_str(), "save", started, &result);
        if let Err(e) = result {
            if had_stale {
                self.cache.remove(key);
            }
            return Err(e);
        }
        metrics::record_bytes_written(tier.as_str(), bytes.len());

        self.cache.set(key, value.clone().into_record(), None);
        Ok(tier)
    }

    /// Read through cache, then backends in strategy order.
    ///
    /// A cache entry of another kind is ignored; a backend value that
    /// doesn't decode as `E` is a `DecodingFailed` error.
    #[instrument(skip(self))]
    pub async fn load<E: Entity>(&self, key: &str) -> Result<Option<E>, StorageError> {
        if let Some(value) = self.cache.get_entity::<E>(key) {
            debug!("Cache hit");
            return Ok(Some(value));
        }
        debug!("Cache miss");

        for &tier in self.read_order() {
            let started = Instant::now();
            let result = self.backend(tier).load(key).await;
            observe(tier.as_str(), "load", started, &result);

            if let Some(bytes) = result? {
                let value: E = codec::decode(&bytes)?;
                self.cache.set(key, value.clone().into_record(), None);
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Delete from both tiers. `true` if either held the key.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let _key = self.lock_key(key).await;
        self.cache.remove(key);

        let mut deleted = false;
        for tier in [Tier::Fast, Tier::Slow] {
            let started = Instant::now();
            let result = self.backend(tier).delete(key).await;
            observe(tier.as_str(), "delete", started, &result);
            deleted |= result?;
        }
        Ok(deleted)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        if self.cache.exists(key) {
            return Ok(true);
        }
        for &tier in self.read_order() {
            if self.backend(tier).exists(key).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Sorted keys across both tiers, optionally filtered by prefix.
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut keys = self.fast.list_keys(prefix).await?;
        keys.extend(self.slow.list_keys(prefix).await?);
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Empty both tiers and the cache.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.fast.clear().await?;
        self.slow.clear().await?;
        self.cache.clear();
        info!("Store cleared");
        Ok(())
    }

    /// Write every `(value, key)` pair.
    ///
    /// Lengths must match; otherwise nothing is written.
    pub async fn save_many<E: Entity, K: AsRef<str>>(
        &self,
        values: &[E],
        keys: &[K],
        priority: StoragePriority,
    ) -> Result<(), StorageError> {
        if values.len() != keys.len() {
            return Err(StorageError::InvalidData(format!(
                "save_many got {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        for (value, key) in values.iter().zip(keys) {
            self.save(key.as_ref(), value, priority).await?;
        }
        Ok(())
    }

    /// Load each key, results in key order.
    pub async fn load_many<E: Entity, K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<E>>, StorageError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.load(key.as_ref()).await?);
        }
        Ok(out)
    }

    /// Delete each key. `true` only if every key was present.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<bool, StorageError> {
        let mut all = true;
        for key in keys {
            all &= self.delete(key.as_ref()).await?;
        }
        Ok(all)
    }

    pub async fn usage(&self) -> Result<StorageUsage, StorageError> {
        let fast_bytes = self.fast.storage_size_bytes().await?;
        let slow_bytes = self.slow.storage_size_bytes().await?;
        let cache_bytes = self.cache.total_bytes() as u64;

        metrics::set_tier_bytes("fast", fast_bytes);
        metrics::set_tier_bytes("slow", slow_bytes);

        Ok(StorageUsage {
            fast_bytes,
            slow_bytes,
            cache_bytes,
            total_bytes: fast_bytes + slow_bytes + cache_bytes,
        })
    }

    pub async fn info(&self) -> Result<StorageInfo, StorageError> {
        let usage = self.usage().await?;
        Ok(StorageInfo {
            strategy: self.strategy(),
            is_optimized: usage.total_bytes < self.config.total_quota_bytes
                && usage.fast_bytes < self.config.fast_tier_quota_bytes,
            usage,
        })
    }

    /// Move every fast-tier key to the slow tier once the fast tier is
    /// over quota. Values move byte-for-byte.
    ///
    /// Only `Hybrid` reads both tiers, so other strategies never rebalance.
    /// Per-key failures are logged and skipped; the sweep always finishes.
    #[instrument(skip(self))]
    pub async fn rebalance(&self) -> Result<RebalanceReport, StorageError> {
        if self.strategy() != StorageStrategy::Hybrid {
            return Ok(RebalanceReport::default());
        }
        let fast_bytes = self.fast.storage_size_bytes().await?;
        if fast_bytes <= self.config.fast_tier_quota_bytes {
            return Ok(RebalanceReport::default());
        }

        info!(
            fast_bytes,
            quota = self.config.fast_tier_quota_bytes,
            "Fast tier over quota, migrating to slow tier"
        );

        let mut report = RebalanceReport {
            triggered: true,
            ..Default::default()
        };
        for key in self.fast.list_keys(None).await? {
            match self.migrate(&key).await {
                Ok(true) => report.migrated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key, error = %e, "Rebalance skipped key");
                    metrics::record_error("fast", "rebalance", e.kind());
                    report.failed += 1;
                }
            }
        }

        metrics::record_rebalance(report.migrated, report.failed);
        info!(migrated = report.migrated, failed = report.failed, "Rebalance complete");
        Ok(report)
    }

    /// Writes to `key` wait until the move is done.
    async fn migrate(&self, key: &str) -> Result<bool, StorageError> {
        let _key = self.lock_key(key).await;
        let Some(bytes) = self.fast.load(key).await? else {
            // Deleted since listing
            return Ok(false);
        };
        self.slow.save(key, &bytes).await?;
        self.fast.delete(key).await?;
        Ok(true)
    }

    /// Rebalance, then sweep the cache.
    pub async fn optimize(&self) -> Result<OptimizeReport, StorageError> {
        let rebalance = self.rebalance().await?;
        let cache = self.cache.cleanup();
        Ok(OptimizeReport { rebalance, cache })
    }

    /// Snapshot both tiers into one versioned document.
    pub async fn backup(&self) -> Result<Vec<u8>, StorageError> {
        let as_text = |bytes: Vec<u8>| {
            String::from_utf8(bytes).map_err(|e| StorageError::BackupFailed(e.to_string()))
        };
        let backup = TieredBackup {
            format_version: TIERED_BACKUP_VERSION,
            created_at: Utc::now(),
            fast: as_text(self.fast.backup().await?)?,
            slow: as_text(self.slow.backup().await?)?,
        };
        let bytes = serde_json::to_vec(&backup).map_err(|e| StorageError::BackupFailed(e.to_string()))?;
        info!(bytes = bytes.len(), "Store backup created");
        Ok(bytes)
    }

    /// Replace both tiers with a backup's contents and drop the cache.
    ///
    /// Both archives are verified before either tier is touched.
    pub async fn restore(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let backup: TieredBackup = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::RestoreFailed(format!("unreadable backup: {e}")))?;
        if backup.format_version != TIERED_BACKUP_VERSION {
            return Err(StorageError::RestoreFailed(format!(
                "unsupported backup format version {} (expected {})",
                backup.format_version, TIERED_BACKUP_VERSION
            )));
        }
        BackupArchive::from_bytes(backup.fast.as_bytes())?;
        BackupArchive::from_bytes(backup.slow.as_bytes())?;

        self.fast.restore(backup.fast.as_bytes()).await?;
        self.slow.restore(backup.slow.as_bytes()).await?;
        self.cache.clear();
        info!(taken_at = %backup.created_at, "Store restored from backup");
        Ok(())
    }
}
