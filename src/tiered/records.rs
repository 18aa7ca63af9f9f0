// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed commit path for entity collections.
//!
//! The store, not the caller, owns `version` and the timestamps: every
//! committed mutation bumps `version` by exactly one and `updated_at` never
//! falls behind `created_at`. A local update never moves `updated_at`
//! backwards, even past a remote timestamp ahead of the local clock.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{StoragePriority, TieredStore};
use crate::entity::{storage_key, Entity};
use crate::storage::StorageError;

impl TieredStore {
    /// Persist a new record, stamping `version = 1` and both timestamps.
    pub async fn create<E: Entity>(&self, mut entity: E) -> Result<E, StorageError> {
        let now = Utc::now();
        let meta = entity.meta_mut();
        meta.version = 1;
        meta.created_at = now;
        meta.updated_at = now;

        self.save(&entity.storage_key(), &entity, StoragePriority::Normal).await?;
        debug!(key = %entity.storage_key(), "Record created");
        Ok(entity)
    }

    /// Commit a mutation of an existing record.
    ///
    /// `created_at` and `version` come from the stored copy, not from the
    /// argument. Fails with `NotFound` if nothing is stored under the key.
    pub async fn update<E: Entity>(&self, mut entity: E) -> Result<E, StorageError> {
        let key = entity.storage_key();
        let stored: E = self
            .load(&key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.clone()))?;

        let stored_meta = stored.meta();
        let meta = entity.meta_mut();
        meta.created_at = stored_meta.created_at;
        meta.version = stored_meta.version + 1;
        meta.updated_at = Utc::now().max(stored_meta.updated_at).max(stored_meta.created_at);

        self.save(&key, &entity, StoragePriority::Normal).await?;
        debug!(key, version = entity.meta().version, "Record updated");
        Ok(entity)
    }

    pub async fn get<E: Entity>(&self, id: Uuid) -> Result<Option<E>, StorageError> {
        self.load(&storage_key(E::KEY_PREFIX, id)).await
    }

    pub async fn remove<E: Entity>(&self, id: Uuid) -> Result<bool, StorageError> {
        self.delete(&storage_key(E::KEY_PREFIX, id)).await
    }

    /// Every stored record of kind `E`, in key order.
    pub async fn list<E: Entity>(&self) -> Result<Vec<E>, StorageError> {
        let keys = self.list_keys(Some(&E::collection_prefix())).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            // Skips keys removed between listing and loading
            if let Some(entity) = self.load(&key).await? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Store a remote record exactly as received.
    pub async fn import<E: Entity>(&self, entity: &E) -> Result<(), StorageError> {
        self.save(&entity.storage_key(), entity, StoragePriority::Normal).await?;
        Ok(())
    }

    /// Overwrite `local`'s fields with `remote`'s and commit.
    ///
    /// Identity and `created_at` stay local, `version` goes up by one and
    /// `updated_at` follows the remote (floored at `created_at`).
    pub async fn apply_remote<E: Entity>(&self, local: &E, remote: &E) -> Result<E, StorageError> {
        let mut merged = local.clone();
        merged.absorb_remote(remote);

        let local_meta = local.meta();
        let meta = merged.meta_mut();
        meta.version = local_meta.version + 1;
        meta.updated_at = remote.updated_at().max(local_meta.created_at);

        self.save(&merged.storage_key(), &merged, StoragePriority::Normal).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::{Epic, Tag, Task};
    use crate::storage::MemoryBackend;
    use chrono::Duration;
    use std::sync::Arc;

    fn store() -> TieredStore {
        TieredStore::with_backends(
            StoreConfig::default(),
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        )
    }

    #[tokio::test]
    async fn test_create_stamps_meta() {
        let store = store();
        let mut task = Task::new("A");
        task.meta.version = 42;
        task.meta.created_at -= Duration::days(3);

        let created = store.create(task).await.unwrap();
        assert_eq!(created.meta.version, 1);
        assert_eq!(created.meta.created_at, created.meta.updated_at);
        assert_eq!(store.get::<Task>(created.id()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_keeps_created_at() {
        let store = store();
        let created = store.create(Task::new("A")).await.unwrap();

        let mut edit = created.clone();
        edit.title = "A'".into();
        edit.meta.created_at += Duration::days(1);
        edit.meta.version = 99;

        let updated = store.update(edit).await.unwrap();
        assert_eq!(updated.meta.version, 2);
        assert_eq!(updated.meta.created_at, created.meta.created_at);
        assert!(updated.meta.updated_at >= updated.meta.created_at);

        let again = store.update(updated.clone()).await.unwrap();
        assert_eq!(again.meta.version, 3);
    }

    #[tokio::test]
    async fn test_update_after_future_remote_keeps_clock_monotonic() {
        let store = store();
        let local = store.create(Task::new("A")).await.unwrap();
        let mut remote = local.clone();
        remote.title = "from a fast clock".into();
        remote.meta.updated_at = local.meta.updated_at + Duration::hours(1);
        let merged = store.apply_remote(&local, &remote).await.unwrap();

        let mut edit = merged.clone();
        edit.title = "local edit".into();
        let updated = store.update(edit).await.unwrap();

        // The same remote snapshot must not win the next sync
        assert!(updated.meta.updated_at >= remote.meta.updated_at);
        assert_eq!(updated.title, "local edit");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = store();
        let err = store.update(Task::new("ghost")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(key) if key.starts_with("task_")));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_one_kind() {
        let store = store();
        store.create(Task::new("t1")).await.unwrap();
        store.create(Task::new("t2")).await.unwrap();
        store.create(Tag::new("urgent")).await.unwrap();
        store.create(Epic::new("Q3")).await.unwrap();

        assert_eq!(store.list::<Task>().await.unwrap().len(), 2);
        assert_eq!(store.list::<Tag>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_id() {
        let store = store();
        let tag = store.create(Tag::new("x")).await.unwrap();
        assert!(store.remove::<Tag>(tag.id()).await.unwrap());
        assert!(!store.remove::<Tag>(tag.id()).await.unwrap());
        assert!(store.get::<Tag>(tag.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_is_verbatim() {
        let store = store();
        let mut remote = Task::new("remote");
        remote.meta.version = 7;

        store.import(&remote).await.unwrap();
        assert_eq!(store.get::<Task>(remote.id()).await.unwrap(), Some(remote));
    }

    #[tokio::test]
    async fn test_apply_remote_takes_fields_and_remote_timestamp() {
        let store = store();
        let local = store.create(Task::new("A")).await.unwrap();

        let mut remote = local.clone();
        remote.title = "A'".into();
        remote.meta.version = 30;
        remote.meta.updated_at = local.meta.updated_at + Duration::seconds(1);

        let merged = store.apply_remote(&local, &remote).await.unwrap();
        assert_eq!(merged.title, "A'");
        assert_eq!(merged.meta.version, local.meta.version + 1);
        assert_eq!(merged.meta.updated_at, remote.meta.updated_at);
        assert_eq!(merged.meta.created_at, local.meta.created_at);
    }
}
