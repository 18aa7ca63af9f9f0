// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the reconciler.

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Reconciler state.
///
/// One pass walks `Idle → FetchingRemote → Merging → Idle`; any failure
/// returns straight to `Idle`. Watch changes with
/// [`super::Reconciler::subscribe()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    FetchingRemote,
    Merging,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::FetchingRemote => write!(f, "FetchingRemote"),
            Self::Merging => write!(f, "Merging"),
        }
    }
}

/// What to do with local records the remote snapshot doesn't mention.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    /// The remote snapshot is complete: anything missing from it is deleted.
    #[default]
    MirrorSnapshot,
    /// The snapshot may be partial: only records listed here are deleted.
    Tombstones(HashSet<Uuid>),
}

impl DeletionPolicy {
    pub(super) fn should_delete(&self, id: &Uuid) -> bool {
        match self {
            Self::MirrorSnapshot => true,
            Self::Tombstones(ids) => ids.contains(id),
        }
    }
}

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Present on both sides with the local copy as new or newer
    pub unchanged: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Remote fetch failed: {0}")]
    Remote(String),
    #[error("Sync cancelled")]
    Cancelled,
    #[error("A sync pass is already running")]
    AlreadyRunning,
}
