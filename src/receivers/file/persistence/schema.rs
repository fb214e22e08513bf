// SPDX-License-Identifier: Apache-2.0

//! Checkpoint schema.
//!
//! Entries are keyed by "dev:ino" and keep the path and file name only for people
//! reading the file. Undelivered bytes (the pending partial record and records
//! assembled but not yet handed out) are stored base64-encoded since they need not
//! be valid text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::receivers::file::input::FileId;

/// Key the checkpoint is stored under within its scope
pub const KNOWN_FILES_KEY: &str = "knownFiles";

/// Current checkpoint schema version
pub const CHECKPOINT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u8,
    /// Key of the source that was current when the checkpoint was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub files: HashMap<String, CheckpointEntry>,
    /// Records assembled before the checkpoint but not yet delivered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ready: Vec<ReadyRecord>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            current: None,
            files: HashMap::new(),
            ready: Vec::new(),
        }
    }
}

impl Checkpoint {
    pub fn insert(&mut self, entry: CheckpointEntry) {
        self.files.insert(entry.key(), entry);
    }

    /// Entry of the source that was current
    pub fn current_entry(&self) -> Option<&CheckpointEntry> {
        self.current.as_ref().and_then(|k| self.files.get(k))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Last known path
    pub path: String,
    /// Last known file name
    pub filename: String,
    pub dev: u64,
    pub ino: u64,
    /// Bytes consumed
    pub offset: u64,
    /// Partial record held by the assembler for this source
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<u8>,
}

impl CheckpointEntry {
    pub fn file_id(&self) -> FileId {
        FileId::new(self.dev, self.ino)
    }

    /// Map key ("dev:ino")
    pub fn key(&self) -> String {
        self.file_id().to_key()
    }
}

/// A complete record that was assembled but not yet delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyRecord {
    pub path: String,
    pub dev: u64,
    pub ino: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
