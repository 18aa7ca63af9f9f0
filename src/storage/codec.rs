// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value encoding shared by every tier.
//!
//! Values are stored as pretty-printed JSON so the slow tier's files stay
//! human-diffable. Dates go through chrono's serde support (RFC 3339).
//! Both tiers hold the same bytes, so moving a value between them never
//! re-encodes it.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::StorageError;

/// File extension used by the slow tier.
pub const FILE_EXTENSION: &str = "json";

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(value).map_err(|e| StorageError::EncodingFailed(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::DecodingFailed(e.to_string()))
}
