// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the entity store.
//!
//! # Example
//!
//! ```
//! use task_sync_engine::{StoreConfig, StorageStrategy};
//!
//! // Minimal config (uses defaults)
//! let config = StoreConfig::default();
//! assert_eq!(config.cache_max_bytes, 50 * 1024 * 1024); // 50 MB
//! assert_eq!(config.strategy, StorageStrategy::Hybrid);
//!
//! // Overrides
//! let config = StoreConfig {
//!     slow_tier_dir: "/var/lib/tasks".into(),
//!     small_value_threshold_bytes: 4096,
//!     ..Default::default()
//! };
//! assert_eq!(config.cache_config().max_entries, 1000);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;

/// Where writes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Everything in the fast tier
    FastOnly,
    /// Everything on disk
    SlowOnly,
    /// Small or high-priority values in the fast tier, the rest on disk
    #[default]
    Hybrid,
}

impl StorageStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FastOnly => "fast_only",
            Self::SlowOnly => "slow_only",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the tiered entity store.
///
/// All fields have sensible defaults. In production you usually only set
/// `slow_tier_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Cache byte budget (default: 50 MB)
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Cache entry budget
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Sliding TTL for cache entries set without an explicit one
    #[serde(default = "default_cache_default_ttl_secs")]
    pub cache_default_ttl_secs: u64,

    /// Janitor sweep period
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,

    #[serde(default)]
    pub strategy: StorageStrategy,

    /// Hybrid routing: values at or below this size go to the fast tier
    #[serde(default = "default_small_value_threshold_bytes")]
    pub small_value_threshold_bytes: usize,

    /// Fast tier size that triggers a rebalance (default: 10 MB)
    #[serde(default = "default_fast_tier_quota_bytes")]
    pub fast_tier_quota_bytes: u64,

    /// Rebalance period in seconds (0 = disabled)
    #[serde(default = "default_rebalance_interval_secs")]
    pub rebalance_interval_secs: u64,

    /// Overall budget reported by `info().is_optimized` (default: 100 MB)
    #[serde(default = "default_total_quota_bytes")]
    pub total_quota_bytes: u64,

    /// Directory holding one file per slow-tier key
    #[serde(default = "default_slow_tier_dir")]
    pub slow_tier_dir: PathBuf,

    /// Hard cap on slow-tier bytes; writes past it fail with `InsufficientSpace`
    #[serde(default)]
    pub slow_tier_max_bytes: Option<u64>,
}

fn default_cache_max_bytes() -> usize { 50 * 1024 * 1024 } // 50 MB
fn default_cache_max_entries() -> usize { 1000 }
fn default_cache_default_ttl_secs() -> u64 { 300 }
fn default_cache_cleanup_interval_secs() -> u64 { 120 }
fn default_small_value_threshold_bytes() -> usize { 1024 }
fn default_fast_tier_quota_bytes() -> u64 { 10 * 1024 * 1024 } // 10 MB
fn default_rebalance_interval_secs() -> u64 { 300 }
fn default_total_quota_bytes() -> u64 { 100 * 1024 * 1024 } // 100 MB
fn default_slow_tier_dir() -> PathBuf { PathBuf::from("./entity_store") }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_max_bytes: default_cache_max_bytes(),
            cache_max_entries: default_cache_max_entries(),
            cache_default_ttl_secs: default_cache_default_ttl_secs(),
            cache_cleanup_interval_secs: default_cache_cleanup_interval_secs(),
            strategy: StorageStrategy::default(),
            small_value_threshold_bytes: default_small_value_threshold_bytes(),
            fast_tier_quota_bytes: default_fast_tier_quota_bytes(),
            rebalance_interval_secs: default_rebalance_interval_secs(),
            total_quota_bytes: default_total_quota_bytes(),
            slow_tier_dir: default_slow_tier_dir(),
            slow_tier_max_bytes: None,
        }
    }
}

impl StoreConfig {
    /// Cache settings carved out of the store config.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_bytes: self.cache_max_bytes,
            max_entries: self.cache_max_entries,
            default_ttl: Duration::from_secs(self.cache_default_ttl_secs),
            cleanup_interval: Duration::from_secs(self.cache_cleanup_interval_secs),
        }
    }

    #[must_use]
    pub fn rebalance_interval(&self) -> Option<Duration> {
        (self.rebalance_interval_secs > 0).then(|| Duration::from_secs(self.rebalance_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.cache_max_entries, 1000);
        assert_eq!(config.cache_default_ttl_secs, 300);
        assert_eq!(config.cache_cleanup_interval_secs, 120);
        assert_eq!(config.small_value_threshold_bytes, 1024);
        assert_eq!(config.fast_tier_quota_bytes, 10 * 1024 * 1024);
        assert_eq!(config.total_quota_bytes, 100 * 1024 * 1024);
        assert_eq!(config.rebalance_interval(), Some(Duration::from_secs(300)));
        assert!(config.slow_tier_max_bytes.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{ "strategy": "slow_only", "slow_tier_dir": "/tmp/x", "rebalance_interval_secs": 0 }"#,
        )
        .unwrap();

        assert_eq!(config.strategy, StorageStrategy::SlowOnly);
        assert_eq!(config.slow_tier_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.rebalance_interval(), None);
        assert_eq!(config.cache_max_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result: Result<StoreConfig, _> = serde_json::from_str(r#"{ "strategy": "cloud" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_config_conversion() {
        let config = StoreConfig {
            cache_default_ttl_secs: 10,
            cache_cleanup_interval_secs: 5,
            ..Default::default()
        };
        let cache = config.cache_config();
        assert_eq!(cache.default_ttl, Duration::from_secs(10));
        assert_eq!(cache.cleanup_interval, Duration::from_secs(5));
    }
}
