// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background maintenance: the cache janitor and the periodic rebalancer.
//!
//! Both are plain tokio tasks tied to one `CancellationToken`. Nothing runs
//! until [`TieredStore::start_maintenance`] is called, and
//! [`TieredStore::shutdown`] stops and joins them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TieredStore;

pub(super) struct MaintenanceHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TieredStore {
    /// Spawn the janitor and the rebalancer, each unless its interval is 0.
    ///
    /// Returns `false` if maintenance is already running.
    pub fn start_maintenance(self: &Arc<Self>) -> bool {
        let mut slot = self.maintenance.lock();
        if slot.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> =
            self.cache.spawn_janitor(shutdown.child_token()).into_iter().collect();
        if let Some(period) = self.config.rebalance_interval() {
            tasks.push(spawn_rebalancer(Arc::downgrade(self), period, shutdown.child_token()));
        }

        info!(
            janitor_secs = self.config.cache_cleanup_interval_secs,
            rebalance_secs = self.config.rebalance_interval_secs,
            "Store maintenance started"
        );
        *slot = Some(MaintenanceHandle { shutdown, tasks });
        true
    }

    #[must_use]
    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance.lock().is_some()
    }

    /// Stop background tasks and wait for them to exit. Idempotent.
    pub async fn shutdown(&self) {
        let handle = self.maintenance.lock().take();
        let Some(handle) = handle else {
            return;
        };

        handle.shutdown.cancel();
        for task in handle.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
        info!("Store maintenance stopped");
    }
}

fn spawn_rebalancer(
    store: Weak<TieredStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // Store dropped without shutdown
                    let Some(store) = store.upgrade() else { break };
                    if let Err(e) = store.rebalance().await {
                        warn!(error = %e, "Periodic rebalance failed");
                    }
                }
            }
        }
        debug!("Rebalancer stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::Task;
    use crate::storage::{MemoryBackend, StorageBackend};
    use crate::tiered::StoragePriority;

    fn store(config: StoreConfig) -> (Arc<TieredStore>, Arc<MemoryBackend>) {
        let fast = Arc::new(MemoryBackend::new());
        let store = TieredStore::with_backends(config, fast.clone(), Arc::new(MemoryBackend::new()));
        (Arc::new(store), fast)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebalancer_runs_on_its_interval() {
        let (store, fast) = store(StoreConfig {
            fast_tier_quota_bytes: 10,
            rebalance_interval_secs: 300,
            ..Default::default()
        });
        store.save("a", &Task::new("a"), StoragePriority::Normal).await.unwrap();

        assert!(store.start_maintenance());
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(fast.exists("a").await.unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!fast.exists("a").await.unwrap());

        store.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_shutdown_idempotent() {
        let (store, _) = store(StoreConfig::default());

        assert!(store.start_maintenance());
        assert!(!store.start_maintenance());
        assert!(store.is_maintenance_running());

        store.shutdown().await;
        store.shutdown().await;
        assert!(!store.is_maintenance_running());

        // Restartable after shutdown
        assert!(store.start_maintenance());
        store.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_start_no_tasks() {
        let (store, _) = store(StoreConfig {
            cache_cleanup_interval_secs: 0,
            rebalance_interval_secs: 0,
            ..Default::default()
        });

        assert!(store.start_maintenance());
        assert!(store.maintenance.lock().as_ref().unwrap().tasks.is_empty());
        tokio::time::sleep(Duration::from_secs(600)).await;
        store.shutdown().await;
        assert!(!store.is_maintenance_running());
    }
}
