// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::codec;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),
    #[error("Save failed: {0}")]
    SaveFailed(String),
    #[error("Load failed: {0}")]
    LoadFailed(String),
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    #[error("Insufficient storage space")]
    InsufficientSpace,
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Backup failed: {0}")]
    BackupFailed(String),
    #[error("Restore failed: {0}")]
    RestoreFailed(String),
}

impl StorageError {
    /// Short label used for the `error_type` metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncodingFailed(_) => "encoding",
            Self::DecodingFailed(_) => "decoding",
            Self::SaveFailed(_) => "save",
            Self::LoadFailed(_) => "load",
            Self::DeleteFailed(_) => "delete",
            Self::InsufficientSpace => "insufficient_space",
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidKey(_) => "invalid_key",
            Self::NotFound(_) => "not_found",
            Self::BackupFailed(_) => "backup",
            Self::RestoreFailed(_) => "restore",
        }
    }
}

/// Key/value persistence contract shared by the fast and slow tiers.
///
/// Values are opaque encoded bytes (see [`codec`]). Typed access goes
/// through [`StorageBackendExt`], which is implemented for every backend
/// including `dyn StorageBackend`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short tier label for logs and metrics ("fast", "slow").
    fn name(&self) -> &'static str;

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns `false` when the key was not present.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys starting with `prefix` (all keys for `None`), sorted.
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;

    /// Serialize every entry into a versioned archive.
    async fn backup(&self) -> Result<Vec<u8>, StorageError>;

    /// Replace all entries with the contents of an archive produced by [`backup`](Self::backup).
    async fn restore(&self, archive: &[u8]) -> Result<(), StorageError>;

    async fn storage_size_bytes(&self) -> Result<u64, StorageError>;
}

/// Typed helpers layered over the byte-level backend contract.
#[async_trait]
pub trait StorageBackendExt: StorageBackend {
    async fn save_value<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let bytes = codec::encode(value)?;
        self.save(key, &bytes).await
    }

    async fn load_value<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        match self.load(key).await? {
            Some(bytes) => codec::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl<B: StorageBackend + ?Sized> StorageBackendExt for B {}

/// Reject keys that cannot double as a file stem.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.starts_with('.')
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_namespaced_keys() {
        assert!(validate_key("task_6f1c1f0e-6f0b-4d53-9a39-2a1f3b0a9d11").is_ok());
        assert!(validate_key("tag_x").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_path_like_keys() {
        for key in ["", "../etc", "a/b", "a\\b", ".hidden"] {
            assert_eq!(
                validate_key(key),
                Err(StorageError::InvalidKey(key.to_string())),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_error_display_carries_message() {
        let err = StorageError::DecodingFailed("expected value at line 1".into());
        assert_eq!(err.to_string(), "Decoding failed: expected value at line 1");
        assert_eq!(err.kind(), "decoding");
    }
}
