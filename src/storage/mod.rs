// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage tiers.
//!
//! - [`memory`]: fast tier, in-process map for small or high-priority records
//! - [`file`]: slow tier, one pretty-JSON file per key
//! - [`codec`]: the single value encoding both tiers share
//! - [`archive`]: versioned backup container used by `backup`/`restore`

pub mod archive;
pub mod codec;
pub mod file;
pub mod memory;
pub mod traits;

pub use archive::{ArchiveEntry, BackupArchive, ARCHIVE_FORMAT_VERSION};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use traits::{StorageBackend, StorageBackendExt, StorageError};
