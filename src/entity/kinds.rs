// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The six concrete entity kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, EntityMeta, Record};

/// Implements [`Entity`] for a struct with a flattened `meta` field.
///
/// `absorb_remote` takes every field from the remote copy and then puts the
/// local metadata back, so new fields are picked up without touching this.
macro_rules! impl_entity {
    ($ty:ident, $variant:ident, $prefix:literal) => {
        impl Entity for $ty {
            const KEY_PREFIX: &'static str = $prefix;

            fn meta(&self) -> &EntityMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut EntityMeta {
                &mut self.meta
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$variant(e) => Some(e),
                    _ => None,
                }
            }

            fn absorb_remote(&mut self, remote: &Self) {
                let meta = std::mem::take(&mut self.meta);
                *self = remote.clone();
                self.meta = meta;
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Review,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub epic_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub dependency_ids: Vec<Uuid>,
    #[serde(default)]
    pub checklist_item_ids: Vec<Uuid>,
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            title: title.into(),
            notes: None,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            is_completed: false,
            start_date: None,
            due_date: None,
            completed_at: None,
            estimated_hours: None,
            assignee: None,
            parent_id: None,
            project_id: None,
            epic_id: None,
            tag_ids: Vec::new(),
            dependency_ids: Vec::new(),
            checklist_item_ids: Vec::new(),
            attachment_ids: Vec::new(),
        }
    }

    /// Overdue when a due date has passed and the task is still open.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date.is_some_and(|due| due < now)
    }
}

impl_entity!(Task, Task, "task");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub epic_id: Option<Uuid>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name: name.into(),
            description: String::new(),
            color: String::new(),
            epic_id: None,
            is_archived: false,
        }
    }
}

impl_entity!(Project, Project, "project");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub is_archived: bool,
}

impl Epic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name: name.into(),
            description: String::new(),
            color: String::new(),
            is_archived: false,
        }
    }
}

impl_entity!(Epic, Epic, "epic");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name: name.into(),
            color: String::new(),
        }
    }
}

impl_entity!(Tag, Tag, "tag");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
    Video,
    Audio,
    Text,
    Markdown,
    #[default]
    Other,
}

impl AttachmentKind {
    /// Classify by file extension (case-insensitive).
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "heic" | "webp" => Self::Image,
            "pdf" | "doc" | "docx" | "pages" | "xls" | "xlsx" => Self::Document,
            "mp4" | "mov" | "avi" | "mkv" => Self::Video,
            "mp3" | "m4a" | "wav" | "aac" => Self::Audio,
            "txt" | "rtf" => Self::Text,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(rename = "type", default)]
    pub kind: AttachmentKind,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, file_path: impl Into<String>, file_size: u64) -> Self {
        let file_name = file_name.into();
        let kind = file_name
            .rsplit_once('.')
            .map_or(AttachmentKind::Other, |(_, ext)| AttachmentKind::from_extension(ext));
        Self {
            meta: EntityMeta::new(),
            file_name,
            file_path: file_path.into(),
            file_size,
            kind,
        }
    }
}

impl_entity!(Attachment, Attachment, "attachment");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: u32,
}

impl ChecklistItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            title: title.into(),
            is_completed: false,
            completed_at: None,
            order: 0,
        }
    }
}

impl_entity!(ChecklistItem, ChecklistItem, "checklist");
