// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::json_file::{JsonFileDatabase, JsonFilePersister};
use super::schema::{CHECKPOINT_VERSION, Checkpoint, KNOWN_FILES_KEY};
use crate::receivers::file::error::{Error, Result};

/// File name of the checkpoint document inside the meta directory
pub const CHECKPOINT_FILE_NAME: &str = "offsets.json";

/// Loads and saves the checkpoint of one reader.
///
/// Checkpoints of different readers may share a meta directory; each reader works
/// in the scope named after its log path.
#[derive(Debug)]
pub struct CheckpointStore {
    persister: JsonFilePersister,
    location: Option<PathBuf>,
}

impl CheckpointStore {
    /// Open the store under `meta_path`, or an in-memory store when there is none.
    pub fn open(meta_path: Option<&Path>, scope: &str) -> Result<Self> {
        let (db, location) = match meta_path {
            Some(dir) => {
                let file = dir.join(CHECKPOINT_FILE_NAME);
                (JsonFileDatabase::open(&file)?, Some(file))
            }
            None => (JsonFileDatabase::open_memory(), None),
        };

        let mut persister = db.persister(scope);
        persister.load()?;
        Ok(Self {
            persister,
            location,
        })
    }

    /// Path of the checkpoint document, if persisted to disk
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// The stored checkpoint, `None` if this scope has never been saved.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let checkpoint: Option<Checkpoint> = self.persister.try_get_raw_json(KNOWN_FILES_KEY)?;
        match checkpoint {
            Some(c) if c.version != CHECKPOINT_VERSION => Err(Error::Persistence(format!(
                "unsupported checkpoint version {} (expected {})",
                c.version, CHECKPOINT_VERSION
            ))),
            Some(c) => {
                info!(
                    scope = self.persister.scope(),
                    files = c.files.len(),
                    "Loaded checkpoint"
                );
                Ok(Some(c))
            }
            None => {
                debug!(scope = self.persister.scope(), "No checkpoint found");
                Ok(None)
            }
        }
    }

    pub fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.persister.set_raw_json(KNOWN_FILES_KEY, checkpoint)?;
        self.persister.sync()?;
        debug!(
            scope = self.persister.scope(),
            files = checkpoint.files.len(),
            "Saved checkpoint"
        );
        Ok(())
    }
}
