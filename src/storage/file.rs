// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Slow tier: one file per key under a dedicated directory.
//!
//! ```text
//! <dir>/
//!   task_6f1c…9d11.json      ← pretty JSON, file stem = storage key
//!   project_0a2b…77c4.json
//!   .task_6f1c…9d11.json.tmp ← in-flight write, hidden from listings
//! ```
//!
//! Writes go to a hidden temp file first and are renamed into place, so a
//! reader never observes a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::archive::BackupArchive;
use super::codec::FILE_EXTENSION;
use super::traits::{validate_key, StorageBackend, StorageError};

pub struct FileBackend {
    dir: PathBuf,
    /// Optional hard cap on the total bytes held by this tier
    max_bytes: Option<u64>,
}

impl FileBackend {
    /// Open (and create if absent) the storage directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_max_bytes(dir, None).await
    }

    /// Open with a byte quota; writes that would exceed it fail with
    /// [`StorageError::InsufficientSpace`].
    pub async fn with_max_bytes(
        dir: impl AsRef<Path>,
        max_bytes: Option<u64>,
    ) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::SaveFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;
        info!(dir = %dir.display(), ?max_bytes, "File tier opened");
        Ok(Self { dir, max_bytes })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{FILE_EXTENSION}"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.{FILE_EXTENSION}.tmp"))
    }

    /// Map a directory entry back to its key; `None` for foreign or hidden files.
    fn key_from_file_name(name: &str) -> Option<&str> {
        if name.starts_with('.') {
            return None;
        }
        name.strip_suffix(FILE_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    }

    /// All `(key, path)` pairs currently on disk.
    async fn entries(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut read_dir = fs::read_dir(&self.dir).await.map_err(|e| {
            StorageError::LoadFailed(format!("cannot list {}: {}", self.dir.display(), e))
        })?;

        let mut entries = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(StorageError::LoadFailed(format!(
                        "cannot list {}: {}",
                        self.dir.display(),
                        e
                    )))
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = Self::key_from_file_name(name) {
                entries.push((key.to_string(), entry.path()));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn file_len(path: &Path) -> Result<Option<u64>, StorageError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::LoadFailed(format!("{}: {}", path.display(), e))),
        }
    }

    async fn ensure_capacity(&self, key: &str, incoming: u64) -> Result<(), StorageError> {
        let Some(max) = self.max_bytes else {
            return Ok(());
        };
        let used = self.storage_size_bytes().await?;
        let replaced = Self::file_len(&self.path_for(key)).await?.unwrap_or(0);
        if used.saturating_sub(replaced) + incoming > max {
            warn!(key, used, incoming, max, "File tier quota exceeded");
            return Err(StorageError::InsufficientSpace);
        }
        Ok(())
    }

    async fn write_atomic(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let tmp = self.temp_path_for(key);
        fs::write(&tmp, value)
            .await
            .map_err(|e| StorageError::SaveFailed(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, self.path_for(key))
            .await
            .map_err(|e| StorageError::SaveFailed(format!("{}: {}", key, e)))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.ensure_capacity(key, value.len() as u64).await?;
        self.write_atomic(key, value).await?;
        debug!(key, bytes = value.len(), "Saved to file tier");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::LoadFailed(format!("{}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(Self::file_len(&self.path_for(key)).await?.is_some())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .collect())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        for (key, path) in self.entries().await? {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::DeleteFailed(format!("{}: {}", key, e))),
            }
        }
        Ok(())
    }

    async fn backup(&self) -> Result<Vec<u8>, StorageError> {
        let mut pairs = Vec::new();
        for (key, path) in self.entries().await? {
            let bytes = fs::read(&path)
                .await
                .map_err(|e| StorageError::BackupFailed(format!("{}: {}", key, e)))?;
            pairs.push((key, bytes));
        }
        let archive = BackupArchive::from_pairs(pairs)?;
        info!(entries = archive.len(), dir = %self.dir.display(), "File tier backup built");
        archive.to_bytes()
    }

    async fn restore(&self, archive: &[u8]) -> Result<(), StorageError> {
        let archive = BackupArchive::from_bytes(archive)?;
        for entry in &archive.entries {
            validate_key(&entry.key).map_err(|e| StorageError::RestoreFailed(e.to_string()))?;
        }

        self.clear()
            .await
            .map_err(|e| StorageError::RestoreFailed(e.to_string()))?;
        for entry in &archive.entries {
            self.write_atomic(&entry.key, entry.value.as_bytes())
                .await
                .map_err(|e| StorageError::RestoreFailed(e.to_string()))?;
        }
        info!(entries = archive.len(), dir = %self.dir.display(), "File tier restored");
        Ok(())
    }

    async fn storage_size_bytes(&self) -> Result<u64, StorageError> {
        let mut total = 0u64;
        for (_, path) in self.entries().await? {
            total += Self::file_len(&path).await?.unwrap_or(0);
        }
        Ok(total)
    }
}
