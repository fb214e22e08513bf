// SPDX-License-Identifier: Apache-2.0

use glob::{MatchOptions, Pattern, glob_with};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::config::OrderBy;
use crate::receivers::file::error::{Error, Result};

/// FileFinder enumerates the regular files directly under a directory, in a
/// deterministic order.
#[derive(Debug, Clone)]
pub struct FileFinder {
    pattern: String,
    ignore_hidden: bool,
    order_by: OrderBy,
}

impl FileFinder {
    /// Create a finder for the files of `dir`
    pub fn new(dir: impl AsRef<Path>, ignore_hidden: bool, order_by: OrderBy) -> Result<Self> {
        let dir = dir.as_ref();
        let dir_str = dir
            .to_str()
            .ok_or_else(|| Error::Config(format!("log_path {:?} is not valid UTF-8", dir)))?;
        let pattern = format!("{}/*", Pattern::escape(dir_str.trim_end_matches('/')));

        Ok(Self {
            pattern,
            ignore_hidden,
            order_by,
        })
    }

    /// Find all files, sorted by the configured key
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        let options = MatchOptions {
            require_literal_leading_dot: self.ignore_hidden,
            ..MatchOptions::new()
        };
        let matches =
            glob_with(&self.pattern, options).map_err(|e| Error::InvalidGlob(e.to_string()))?;

        let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in matches {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;

            // A file can vanish between globbing and stat; it simply isn't listed
            let metadata = match path.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, path));
        }

        match self.order_by {
            OrderBy::ModTime => found.sort(),
            OrderBy::Name => found.sort_by(|a, b| a.1.cmp(&b.1)),
        }

        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}
