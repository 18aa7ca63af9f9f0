// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot reconciler.
//!
//! Merges an authoritative remote snapshot of one collection into the local
//! store, last writer wins by `updated_at`:
//!
//! | local      | remote     | action                                   |
//! |------------|------------|------------------------------------------|
//! | absent     | present    | create (remote stored verbatim)          |
//! | older      | newer      | update (remote fields, local version+1)  |
//! | same/newer | present    | nothing (ties keep local)                |
//! | present    | absent     | delete, subject to [`DeletionPolicy`]    |
//!
//! Entities are processed in collection order with no cross-entity
//! atomicity. A failure or cancellation mid-pass keeps whatever was already
//! applied; the next pass converges the rest.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use task_sync_engine::{DeletionPolicy, Reconciler, StoreConfig, TieredStore};
//! use task_sync_engine::entity::Task;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(remote: Vec<Task>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TieredStore::open(StoreConfig::default()).await?);
//! let reconciler = Reconciler::new(store.clone());
//!
//! let local = store.list::<Task>().await?;
//! let report = reconciler
//!     .reconcile(&local, &remote, &DeletionPolicy::MirrorSnapshot, &CancellationToken::new())
//!     .await?;
//! println!("{} created, {} updated, {} deleted", report.created, report.updated, report.deleted);
//! # Ok(())
//! # }
//! ```

mod types;

pub use types::{DeletionPolicy, ReconcileReport, SyncError, SyncState};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entity::Entity;
use crate::metrics;
use crate::tiered::TieredStore;

/// Source of the authoritative snapshot for one entity kind.
#[async_trait]
pub trait RemoteSource<E: Entity>: Send + Sync {
    /// Every remote record of this kind. Failures should use [`SyncError::Remote`].
    async fn fetch_all(&self) -> Result<Vec<E>, SyncError>;
}

pub struct Reconciler {
    store: Arc<TieredStore>,
    state_tx: watch::Sender<SyncState>,
    /// Held for the duration of a pass
    pass: Mutex<()>,
}

/// Puts the state back to `Idle` however the pass ends.
struct IdleOnDrop<'a>(&'a watch::Sender<SyncState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncState::Idle);
        metrics::set_sync_state("Idle");
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<TieredStore>) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            state_tx,
            pass: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, state: SyncState) {
        debug!(%state, "Sync state");
        self.state_tx.send_replace(state);
        metrics::set_sync_state(&state.to_string());
    }

    /// Merge `remote` into the store given the current `local` collection.
    ///
    /// `cancel` is checked before each per-entity step.
    #[instrument(skip_all, fields(collection = E::KEY_PREFIX, local = local.len(), remote = remote.len()))]
    pub async fn reconcile<E: Entity>(
        &self,
        local: &[E],
        remote: &[E],
        policy: &DeletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, SyncError> {
        let _pass = self.pass.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        let _idle = IdleOnDrop(&self.state_tx);

        self.transition(SyncState::Merging);
        self.merge(local, remote, policy, cancel).await
    }

    /// Fetch the remote snapshot, read the local collection and merge.
    #[instrument(skip_all, fields(collection = E::KEY_PREFIX))]
    pub async fn sync_collection<E, R>(
        &self,
        source: &R,
        policy: &DeletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, SyncError>
    where
        E: Entity,
        R: RemoteSource<E> + ?Sized,
    {
        let _pass = self.pass.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        let _idle = IdleOnDrop(&self.state_tx);
        let started = Instant::now();

        let result = self.fetch_and_merge(source, policy, cancel).await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_sync_cycle(E::KEY_PREFIX, status, started.elapsed());
        result
    }

    async fn fetch_and_merge<E, R>(
        &self,
        source: &R,
        policy: &DeletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, SyncError>
    where
        E: Entity,
        R: RemoteSource<E> + ?Sized,
    {
        self.transition(SyncState::FetchingRemote);
        let remote = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = source.fetch_all() => fetched?,
        };
        let local = self.store.list::<E>().await?;

        self.transition(SyncState::Merging);
        self.merge(&local, &remote, policy, cancel).await
    }

    async fn merge<E: Entity>(
        &self,
        local: &[E],
        remote: &[E],
        policy: &DeletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();
        let result = self.apply(local, remote, policy, cancel, &mut report).await;

        metrics::record_sync_changes(E::KEY_PREFIX, report.created, report.updated, report.deleted);
        match &result {
            Ok(()) => info!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                unchanged = report.unchanged,
                "Reconcile complete"
            ),
            Err(SyncError::Cancelled) => warn!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                "Reconcile cancelled; applied changes are kept"
            ),
            Err(e) => error!(
                error = %e,
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                "Reconcile failed; applied changes are kept"
            ),
        }
        result.map(|()| report)
    }

    async fn apply<E: Entity>(
        &self,
        local: &[E],
        remote: &[E],
        policy: &DeletionPolicy,
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        let local_by_id: HashMap<Uuid, &E> = local.iter().map(|e| (e.id(), e)).collect();
        let mut seen: HashSet<Uuid> = HashSet::with_capacity(remote.len());

        for theirs in remote {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if !seen.insert(theirs.id()) {
                warn!(id = %theirs.id(), "Duplicate id in remote snapshot, keeping first");
                continue;
            }

            match local_by_id.get(&theirs.id()) {
                None => {
                    self.store.import(theirs).await?;
                    report.created += 1;
                }
                Some(ours) if theirs.updated_at() > ours.updated_at() => {
                    self.store.apply_remote(*ours, theirs).await?;
                    report.updated += 1;
                }
                Some(_) => report.unchanged += 1,
            }
        }

        for ours in local {
            if seen.contains(&ours.id()) || !policy.should_delete(&ours.id()) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if self.store.remove::<E>(ours.id()).await? {
                report.deleted += 1;
            }
        }
        Ok(())
    }
}
