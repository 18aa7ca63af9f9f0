// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process record cache.
//!
//! Size- and count-bounded, with a sliding TTL per entry and LRU eviction.
//!
//! # Expiry
//!
//! An entry expires when `now - last_access > ttl`. Every successful
//! [`Cache::get`] refreshes `last_access`, so an entry that keeps being read
//! never expires. [`Cache::exists`] applies the same check without
//! refreshing.
//!
//! # Locking
//!
//! The key index sits behind one `RwLock`. Reads (`get`, `exists`) share the
//! lock and refresh access time through atomics; `set`, `remove`, `clear`
//! and eviction take it exclusively. Eviction works on a snapshot of the
//! index taken inside that same critical section.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive expiry with a
//! paused runtime clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::entity::{Entity, Record};
use crate::metrics;

/// Size charged for a value whose serialized length can't be measured.
pub const FALLBACK_ENTRY_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_bytes: usize,
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            max_entries: 1000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(120),
        }
    }
}

/// Entries dropped by one [`Cache::cleanup`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired: usize,
    pub evicted: usize,
}

struct Slot<V> {
    value: V,
    size: usize,
    ttl: Duration,
    /// Nanos since the cache epoch
    last_access: AtomicU64,
    /// Cache-wide access counter, orders LRU when timestamps tie
    access_seq: AtomicU64,
}

impl<V> Slot<V> {
    fn is_expired(&self, now_nanos: u64) -> bool {
        let idle = now_nanos.saturating_sub(self.last_access.load(Ordering::Acquire));
        Duration::from_nanos(idle) > self.ttl
    }

    fn touch(&self, now_nanos: u64, seq: u64) {
        self.last_access.fetch_max(now_nanos, Ordering::AcqRel);
        self.access_seq.fetch_max(seq, Ordering::AcqRel);
    }
}

struct Index<V> {
    entries: HashMap<String, Slot<V>>,
    total_bytes: usize,
}

impl<V> Index<V> {
    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.total_bytes -= slot.size;
        Some(slot)
    }

    fn over(&self, config: &CacheConfig) -> bool {
        self.total_bytes > config.max_bytes || self.entries.len() > config.max_entries
    }

    /// Drop least-recently-accessed entries until both bounds hold.
    fn evict(&mut self, config: &CacheConfig) -> usize {
        if !self.over(config) {
            return 0;
        }

        let mut by_age: Vec<(u64, u64, String)> = self
            .entries
            .iter()
            .map(|(k, s)| {
                (
                    s.last_access.load(Ordering::Acquire),
                    s.access_seq.load(Ordering::Acquire),
                    k.clone(),
                )
            })
            .collect();
        by_age.sort_unstable();

        let mut evicted = 0;
        let mut bytes = 0;
        for (_, _, key) in by_age {
            if !self.over(config) {
                break;
            }
            if let Some(slot) = self.remove(&key) {
                evicted += 1;
                bytes += slot.size;
            }
        }

        metrics::record_cache_eviction("lru", evicted, bytes);
        evicted
    }
}

/// TTL + LRU cache keyed by storage key.
pub struct Cache<V> {
    config: CacheConfig,
    epoch: Instant,
    seq: AtomicU64,
    index: RwLock<Index<V>>,
}

impl<V> Cache<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            seq: AtomicU64::new(0),
            index: RwLock::new(Index {
                entries: HashMap::new(),
                total_bytes: 0,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert or replace `key`. `ttl` falls back to the configured default.
    ///
    /// Never fails: a value that can't be serialized for sizing is charged
    /// [`FALLBACK_ENTRY_SIZE`].
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let size = serde_json::to_vec(&value).map_or(FALLBACK_ENTRY_SIZE, |b| b.len());
        let slot = Slot {
            value,
            size,
            ttl: ttl.unwrap_or(self.config.default_ttl),
            last_access: AtomicU64::new(self.now_nanos()),
            access_seq: AtomicU64::new(self.next_seq()),
        };

        let mut index = self.index.write();
        if let Some(old) = index.entries.insert(key, slot) {
            index.total_bytes -= old.size;
        }
        index.total_bytes += size;
        index.evict(&self.config);
        metrics::set_cache_stats(index.entries.len(), index.total_bytes);
    }

    /// Look up `key`, refreshing its access time on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.now_nanos();
        {
            let index = self.index.read();
            match index.entries.get(key) {
                None => {
                    metrics::record_cache_lookup("miss");
                    return None;
                }
                Some(slot) if !slot.is_expired(now) => {
                    slot.touch(now, self.next_seq());
                    metrics::record_cache_lookup("hit");
                    return Some(slot.value.clone());
                }
                Some(_) => {}
            }
        }

        // Recheck under the write lock: a concurrent set may have replaced it.
        let mut index = self.index.write();
        if index.entries.get(key).is_some_and(|s| s.is_expired(now)) {
            if let Some(slot) = index.remove(key) {
                trace!(key, "Cache entry expired on read");
                metrics::record_cache_eviction("expired", 1, slot.size);
            }
        }
        metrics::record_cache_lookup("expired");
        None
    }

    /// Whether a live entry exists. Does not refresh access time.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        let now = self.now_nanos();
        self.index
            .read()
            .entries
            .get(key)
            .is_some_and(|s| !s.is_expired(now))
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut index = self.index.write();
        let removed = index.remove(key).is_some();
        metrics::set_cache_stats(index.entries.len(), index.total_bytes);
        removed
    }

    pub fn clear(&self) {
        let mut index = self.index.write();
        index.entries.clear();
        index.total_bytes = 0;
        metrics::set_cache_stats(0, 0);
    }

    /// Drop every expired entry, then evict down to capacity.
    pub fn cleanup(&self) -> CleanupStats {
        let now = self.now_nanos();
        let mut index = self.index.write();

        let expired_keys: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired_bytes = 0;
        for key in &expired_keys {
            if let Some(slot) = index.remove(key) {
                expired_bytes += slot.size;
            }
        }
        if !expired_keys.is_empty() {
            metrics::record_cache_eviction("expired", expired_keys.len(), expired_bytes);
        }

        let evicted = index.evict(&self.config);
        metrics::set_cache_stats(index.entries.len(), index.total_bytes);

        CleanupStats {
            expired: expired_keys.len(),
            evicted,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().entries.is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.index.read().total_bytes
    }

    /// Run [`cleanup`](Self::cleanup) every `cleanup_interval` until `shutdown` fires.
    ///
    /// A zero interval disables the janitor and returns `None`.
    pub fn spawn_janitor(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.config.cleanup_interval;
        if period.is_zero() {
            debug!("Cache janitor disabled");
            return None;
        }
        let cache = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("Cache janitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = cache.cleanup();
                        if stats.expired > 0 || stats.evicted > 0 {
                            debug!(expired = stats.expired, evicted = stats.evicted, "Cache janitor sweep");
                        }
                    }
                }
            }
        }))
    }
}

impl Cache<Record> {
    /// Typed lookup. A live entry holding another kind is a miss.
    pub fn get_entity<E: Entity>(&self, key: &str) -> Option<E> {
        self.get(key).and_then(E::from_record)
    }
}
