// SPDX-License-Identifier: Apache-2.0

//! JSON file storage with atomic writes.
//!
//! One document holds any number of scopes, each a map of keys to raw JSON values.
//! Every sync rewrites the whole document to a temp file and renames it over the
//! original, so a crash leaves either the old or the new checkpoint on disk.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::receivers::file::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseState {
    scopes: HashMap<String, HashMap<String, serde_json::Value>>,
}

/// A shared handle to one JSON document
#[derive(Debug, Clone)]
pub struct JsonFileDatabase {
    /// Empty for in-memory databases
    path: PathBuf,
    state: Arc<RwLock<DatabaseState>>,
}

impl JsonFileDatabase {
    /// Open the document at `path`, or start an empty one if it does not exist.
    ///
    /// An unreadable or unparsable document is an error rather than an empty state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path).map_err(|e| {
                Error::Persistence(format!("failed to open checkpoint {:?}: {}", path, e))
            })?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                Error::Persistence(format!("corrupted checkpoint {:?}: {}", path, e))
            })?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Persistence(format!(
                        "failed to create checkpoint directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
            DatabaseState::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// A database that never touches disk
    pub fn open_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(DatabaseState::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        if self.is_memory() {
            None
        } else {
            Some(&self.path)
        }
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Handle restricted to one scope
    pub fn persister(&self, scope: impl Into<String>) -> JsonFilePersister {
        JsonFilePersister {
            db: self.clone(),
            scope: scope.into(),
            cache: HashMap::new(),
        }
    }

    fn write_to_disk(&self) -> Result<()> {
        if self.is_memory() {
            return Ok(());
        }
        let state = self
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        atomic_write(&self.path, &state)
    }
}

/// Keys of one scope, cached until synced back to the database.
#[derive(Debug)]
pub struct JsonFilePersister {
    db: JsonFileDatabase,
    scope: String,
    cache: HashMap<String, serde_json::Value>,
}

impl JsonFilePersister {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn set_raw_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    /// `Ok(None)` if the key is absent, an error if it is present but does not parse.
    pub fn try_get_raw_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
                Error::Persistence(format!(
                    "invalid `{}` in checkpoint scope `{}`: {}",
                    key, self.scope, e
                ))
            }),
        }
    }

    pub fn delete(&mut self, key: &str) {
        self.cache.remove(key);
    }

    /// Replace the cache with what the database holds for this scope.
    pub fn load(&mut self) -> Result<()> {
        let state = self
            .db
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        self.cache = state.scopes.get(&self.scope).cloned().unwrap_or_default();
        Ok(())
    }

    /// Write the cache back to the database and the database to disk.
    pub fn sync(&self) -> Result<()> {
        {
            let mut state = self
                .db
                .state
                .write()
                .map_err(|e| Error::Persistence(e.to_string()))?;
            state.scopes.insert(self.scope.clone(), self.cache.clone());
        }
        self.db.write_to_disk()
    }
}

/// Write state to a uniquely named temp file, then rename it over `path`.
fn atomic_write(path: &Path, state: &DatabaseState) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let write = || -> std::io::Result<()> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Persistence(format!(
            "failed to write checkpoint {:?}: {}",
            temp_path, e
        )));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Persistence(format!("failed to replace checkpoint {:?}: {}", path, e))
    })
}
