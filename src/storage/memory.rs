// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fast tier: an in-process key/value map.
//!
//! Intended for small or high-priority records. The tier itself never
//! rejects a write for capacity; the tiered store keeps it small through
//! its routing threshold and periodic rebalancing.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::archive::BackupArchive;
use super::traits::{validate_key, StorageBackend, StorageError};

pub struct MemoryBackend {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "fast"
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }

    async fn backup(&self) -> Result<Vec<u8>, StorageError> {
        let pairs = self
            .data
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let archive = BackupArchive::from_pairs(pairs)?;
        debug!(entries = archive.len(), "Fast tier backup built");
        archive.to_bytes()
    }

    async fn restore(&self, archive: &[u8]) -> Result<(), StorageError> {
        // Verify before touching current contents.
        let archive = BackupArchive::from_bytes(archive)?;
        for entry in &archive.entries {
            validate_key(&entry.key).map_err(|e| StorageError::RestoreFailed(e.to_string()))?;
        }

        self.data.clear();
        for entry in archive.entries {
            self.data.insert(entry.key, entry.value.into_bytes());
        }
        Ok(())
    }

    async fn storage_size_bytes(&self) -> Result<u64, StorageError> {
        Ok(self.data.iter().map(|r| r.value().len() as u64).sum())
    }
}
