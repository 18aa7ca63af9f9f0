//! # Task Sync Engine
//!
//! Local persistence and synchronization for task/project/epic records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reconciler                           │
//! │  • Merges a remote snapshot into the store (LWW)           │
//! │  • Idle → FetchingRemote → Merging, watchable              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Tiered Store                          │
//! │  • Owns version/timestamps on commit                       │
//! │  • Routes writes by strategy, size and priority            │
//! │  • Periodic rebalance of an over-quota fast tier           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Record Cache                          │
//! │  • Sliding TTL, byte and entry bounds, LRU eviction        │
//! │  • Janitor task sweeps expired entries                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 ┌────────────┴────────────┐
//!                 ▼                         ▼
//! ┌───────────────────────────┐ ┌───────────────────────────────┐
//! │   Fast tier (in-memory)   │ │  Slow tier (file per key)     │
//! │  • Small / high priority  │ │  • Pretty JSON, atomic rename │
//! └───────────────────────────┘ └───────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use task_sync_engine::{StoreConfig, TieredStore};
//! use task_sync_engine::entity::{Entity, Task};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = StoreConfig {
//!         slow_tier_dir: "/var/lib/tasks".into(),
//!         ..Default::default()
//!     };
//!     let store = Arc::new(TieredStore::open(config).await.expect("Failed to open"));
//!     store.start_maintenance();
//!
//!     let task = store.create(Task::new("Write docs")).await.unwrap();
//!     let mut edit = task.clone();
//!     edit.is_completed = true;
//!     let task = store.update(edit).await.unwrap();
//!     assert_eq!(task.meta.version, 2);
//!
//!     store.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`entity`]: Record kinds, shared metadata and storage keys
//! - [`cache`]: TTL/LRU record cache
//! - [`storage`]: Backend contract, fast and slow tiers, codec, archives
//! - [`tiered`]: The [`TieredStore`] entry point
//! - [`sync`]: The snapshot [`Reconciler`]
//! - [`metrics`]: `metrics` crate instrumentation

pub mod cache;
pub mod config;
pub mod entity;
pub mod metrics;
pub mod storage;
pub mod sync;
pub mod tiered;

pub use cache::{Cache, CacheConfig, CleanupStats};
pub use config::{StorageStrategy, StoreConfig};
pub use entity::{Entity, EntityMeta, Record};
pub use storage::{FileBackend, MemoryBackend, StorageBackend, StorageBackendExt, StorageError};
pub use sync::{DeletionPolicy, ReconcileReport, Reconciler, RemoteSource, SyncError, SyncState};
pub use tiered::{
    OptimizeReport, RebalanceReport, StorageInfo, StoragePriority, StorageUsage, Tier, TieredStore,
};
