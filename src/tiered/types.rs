// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CleanupStats;
use crate::config::StorageStrategy;

/// Write priority. Under the hybrid strategy `High` always lands in the fast tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoragePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Which backend a key was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fast,
    Slow,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        }
    }
}

/// Point-in-time byte usage. Recomputed on every call, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub fast_bytes: u64,
    pub slow_bytes: u64,
    pub cache_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub strategy: StorageStrategy,
    pub usage: StorageUsage,
    /// Total under the overall quota and fast tier under its own quota
    pub is_optimized: bool,
}

/// Outcome of one rebalance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    /// Fast tier was over quota and a migration ran
    pub triggered: bool,
    pub migrated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub rebalance: RebalanceReport,
    pub cache: CleanupStats,
}

pub(super) const TIERED_BACKUP_VERSION: u32 = 1;

/// Both tiers' archives in one document.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TieredBackup {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub fast: String,
    pub slow: String,
}
