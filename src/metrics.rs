// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the entity store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing an exporter.
//!
//! # Metric Naming Convention
//! - `entity_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `tier`: cache, fast, slow
//! - `operation`: save, load, delete, list, backup, restore, rebalance
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "entity_store_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "entity_store_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an error with its [`StorageError::kind`](crate::StorageError::kind)
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "entity_store_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup: `hit`, `miss` or `expired`
pub fn record_cache_lookup(outcome: &'static str) {
    counter!(
        "entity_store_cache_lookups_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record entries dropped from the cache, by `reason` (`lru` or `expired`)
pub fn record_cache_eviction(reason: &'static str, count: usize, bytes: usize) {
    counter!("entity_store_cache_evictions_total", "reason" => reason).increment(count as u64);
    counter!("entity_store_cache_evicted_bytes_total", "reason" => reason).increment(bytes as u64);
}

/// Set current cache occupancy
pub fn set_cache_stats(entries: usize, bytes: usize) {
    gauge!("entity_store_cache_entries").set(entries as f64);
    gauge!("entity_store_cache_bytes").set(bytes as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// TIERS
// ═══════════════════════════════════════════════════════════════════════════

/// Set a backend's current size
pub fn set_tier_bytes(tier: &str, bytes: u64) {
    gauge!(
        "entity_store_tier_bytes",
        "tier" => tier.to_string()
    )
    .set(bytes as f64);
}

/// Record bytes written to a tier
pub fn record_bytes_written(tier: &str, bytes: usize) {
    counter!(
        "entity_store_bytes_written_total",
        "tier" => tier.to_string()
    )
    .increment(bytes as u64);
}

/// Record a rebalance sweep
pub fn record_rebalance(migrated: usize, failed: usize) {
    counter!("entity_store_rebalance_runs_total").increment(1);
    counter!("entity_store_rebalance_migrated_total").increment(migrated as u64);
    if failed > 0 {
        counter!("entity_store_rebalance_failed_total").increment(failed as u64);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNC
// ═══════════════════════════════════════════════════════════════════════════

/// Set reconciler state (for monitoring state machine transitions)
pub fn set_sync_state(state: &str) {
    counter!(
        "entity_store_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record the per-entity outcome counts of one reconcile pass
pub fn record_sync_changes(collection: &str, created: usize, updated: usize, deleted: usize) {
    for (action, count) in [("create", created), ("update", updated), ("delete", deleted)] {
        counter!(
            "entity_store_sync_changes_total",
            "collection" => collection.to_string(),
            "action" => action
        )
        .increment(count as u64);
    }
}

/// Record a finished sync cycle
pub fn record_sync_cycle(collection: &str, status: &str, duration: Duration) {
    counter!(
        "entity_store_sync_cycles_total",
        "collection" => collection.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "entity_store_sync_seconds",
        "collection" => collection.to_string()
    )
    .record(duration.as_secs_f64());
}
