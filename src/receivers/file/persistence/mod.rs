// SPDX-License-Identifier: Apache-2.0

//! Checkpoint persistence.
//!
//! Uses JSON file storage with atomic writes so a reader can resume exactly where it
//! stopped, partial multi-line record included.

mod json_file;
mod schema;
mod store;

pub use json_file::{JsonFileDatabase, JsonFilePersister};
pub use schema::{CHECKPOINT_VERSION, Checkpoint, CheckpointEntry, KNOWN_FILES_KEY, ReadyRecord};
pub use store::{CHECKPOINT_FILE_NAME, CheckpointStore};
