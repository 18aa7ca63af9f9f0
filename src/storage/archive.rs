// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Versioned backup container.
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "created_at": "2025-03-01T12:00:00Z",
//!   "entries": [{ "key": "task_…", "value": "{ … }" }],
//!   "checksum": "<sha256 hex over keys and values>"
//! }
//! ```
//!
//! Values are carried as the exact text each tier stored, so a restore
//! writes back byte-identical records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::traits::StorageError;

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArchive {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ArchiveEntry>,
    pub checksum: String,
}

impl BackupArchive {
    /// Build an archive from raw `(key, bytes)` pairs. Entries are sorted by key.
    pub fn from_pairs(pairs: Vec<(String, Vec<u8>)>) -> Result<Self, StorageError> {
        let mut entries = pairs
            .into_iter()
            .map(|(key, bytes)| {
                String::from_utf8(bytes)
                    .map(|value| ArchiveEntry { key: key.clone(), value })
                    .map_err(|_| StorageError::BackupFailed(format!("value for '{key}' is not UTF-8")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let checksum = checksum(&entries);
        Ok(Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            created_at: Utc::now(),
            entries,
            checksum,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::BackupFailed(e.to_string()))
    }

    /// Parse and verify an archive (format version and checksum).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let archive: Self = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::RestoreFailed(format!("unreadable archive: {e}")))?;

        if archive.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(StorageError::RestoreFailed(format!(
                "unsupported archive format version {} (expected {})",
                archive.format_version, ARCHIVE_FORMAT_VERSION
            )));
        }

        let expected = checksum(&archive.entries);
        if archive.checksum != expected {
            return Err(StorageError::RestoreFailed(format!(
                "checksum mismatch: archive says {}, entries hash to {}",
                archive.checksum, expected
            )));
        }

        Ok(archive)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn checksum(entries: &[ArchiveEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        // Length prefixes keep ("ab","c") and ("a","bc") distinct.
        hasher.update((entry.key.len() as u64).to_be_bytes());
        hasher.update(entry.key.as_bytes());
        hasher.update((entry.value.len() as u64).to_be_bytes());
        hasher.update(entry.value.as_bytes());
    }
    hex::encode(hasher.finalize())
}
