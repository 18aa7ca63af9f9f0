// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity records.
//!
//! Every stored kind (task, project, epic, tag, attachment, checklist item)
//! carries the same [`EntityMeta`] and is addressed by a namespaced
//! storage key: `<prefix>_<uuid>`.
//!
//! # Example
//!
//! ```
//! use task_sync_engine::entity::{Entity, Task, parse_storage_key};
//!
//! let task = Task::new("Write release notes");
//! let key = task.storage_key();
//! assert!(key.starts_with("task_"));
//!
//! let (prefix, id) = parse_storage_key(&key).unwrap();
//! assert_eq!(prefix, Task::KEY_PREFIX);
//! assert_eq!(id, task.id());
//! ```

mod kinds;

pub use kinds::{
    Attachment, AttachmentKind, ChecklistItem, Epic, Project, Tag, Task, TaskPriority, TaskStatus,
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity, version and timestamps shared by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub id: Uuid,
    /// Incremented by exactly one per committed mutation
    pub version: u64,
    /// Set once at creation
    pub created_at: DateTime<Utc>,
    /// Refreshed by the store at commit time, never earlier than `created_at`
    pub updated_at: DateTime<Utc>,
}

impl EntityMeta {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored domain object.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Namespace for this kind's storage keys (without the trailing `_`).
    const KEY_PREFIX: &'static str;

    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    fn into_record(self) -> Record;

    /// `None` when the record holds a different kind.
    fn from_record(record: Record) -> Option<Self>;

    /// Copy every type-specific field from `remote`, leaving `meta` alone.
    fn absorb_remote(&mut self, remote: &Self);

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.meta().updated_at
    }

    fn storage_key(&self) -> String {
        storage_key(Self::KEY_PREFIX, self.id())
    }

    /// Prefix used for collection scans (`"task_"`).
    fn collection_prefix() -> String {
        format!("{}_", Self::KEY_PREFIX)
    }
}

/// Build `<prefix>_<uuid>`.
#[must_use]
pub fn storage_key(prefix: &str, id: Uuid) -> String {
    format!("{prefix}_{id}")
}

/// Split a storage key into its prefix and id.
///
/// A uuid never contains `_`, so the last `_` is the separator.
#[must_use]
pub fn parse_storage_key(key: &str) -> Option<(&str, Uuid)> {
    let (prefix, id) = key.rsplit_once('_')?;
    if prefix.is_empty() {
        return None;
    }
    Uuid::parse_str(id).ok().map(|id| (prefix, id))
}

/// Typed envelope over the finite set of entity kinds.
///
/// The cache stores `Record`s, so a typed read is a variant match rather
/// than a downcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Task(Task),
    Project(Project),
    Epic(Epic),
    Tag(Tag),
    Attachment(Attachment),
    ChecklistItem(ChecklistItem),
}

impl Record {
    #[must_use]
    pub fn meta(&self) -> &EntityMeta {
        match self {
            Self::Task(e) => e.meta(),
            Self::Project(e) => e.meta(),
            Self::Epic(e) => e.meta(),
            Self::Tag(e) => e.meta(),
            Self::Attachment(e) => e.meta(),
            Self::ChecklistItem(e) => e.meta(),
        }
    }

    #[must_use]
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Task(_) => Task::KEY_PREFIX,
            Self::Project(_) => Project::KEY_PREFIX,
            Self::Epic(_) => Epic::KEY_PREFIX,
            Self::Tag(_) => Tag::KEY_PREFIX,
            Self::Attachment(_) => Attachment::KEY_PREFIX,
            Self::ChecklistItem(_) => ChecklistItem::KEY_PREFIX,
        }
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        storage_key(self.key_prefix(), self.meta().id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_meta_is_version_one_with_equal_timestamps() {
        let meta = EntityMeta::new();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn test_storage_key_round_trip() {
        let id = Uuid::new_v4();
        let key = storage_key("checklist", id);
        assert_eq!(parse_storage_key(&key), Some(("checklist", id)));
    }

    #[test]
    fn test_parse_storage_key_rejects_malformed() {
        assert_eq!(parse_storage_key("task"), None);
        assert_eq!(parse_storage_key("task_not-a-uuid"), None);
        assert_eq!(parse_storage_key(&format!("_{}", Uuid::new_v4())), None);
    }

    #[test]
    fn test_record_match_filters_kind() {
        let task = Task::new("A");
        let record = task.clone().into_record();

        assert_eq!(record.storage_key(), task.storage_key());
        assert_eq!(Task::from_record(record.clone()), Some(task));
        assert_eq!(Project::from_record(record), None);
    }

    #[test]
    fn test_collection_prefix_scopes_one_kind() {
        let task = Task::new("A");
        let epic = Epic::new("E");
        assert!(task.storage_key().starts_with(&Task::collection_prefix()));
        assert!(!epic.storage_key().starts_with(&Task::collection_prefix()));
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let text = serde_json::to_string(&EntityMeta::new()).unwrap();
        assert!(text.contains("createdAt"));
        assert!(text.contains("updatedAt"));
    }
}
