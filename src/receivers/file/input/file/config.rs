// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Where to start reading a source that has no checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFrom {
    /// Start reading from the beginning of the file
    #[default]
    Oldest,
    /// Start reading from the end of the file (only new content)
    Newest,
}

impl FromStr for ReadFrom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oldest" | "beginning" => Ok(ReadFrom::Oldest),
            "newest" | "end" => Ok(ReadFrom::Newest),
            other => Err(format!("unknown read_from value: {}", other)),
        }
    }
}

/// Whether the tracker follows one file or every file in a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Tail a single file, following rename-based rotation
    #[default]
    File,
    /// Tail the files of a directory one after another
    Dir,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "single" | "single-file" => Ok(Mode::File),
            "dir" | "directory" => Ok(Mode::Dir),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Sort key used to order the files of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    /// Oldest modification time first, ties broken by name
    #[default]
    ModTime,
    /// Lexicographic file name order
    Name,
}

impl FromStr for OrderBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "modtime" | "mtime" => Ok(OrderBy::ModTime),
            "name" => Ok(OrderBy::Name),
            other => Err(format!("unknown order_by value: {}", other)),
        }
    }
}

/// Configuration for the source tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Single file or directory
    pub mode: Mode,
    /// Root file or directory
    pub log_path: PathBuf,
    /// Initial position for sources without a checkpoint
    pub read_from: ReadFrom,
    /// Skip dotfiles during directory enumeration
    pub ignore_hidden: bool,
    /// Directory ordering
    pub order_by: OrderBy,
    /// Bytes requested per raw read
    pub buf_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            log_path: PathBuf::new(),
            read_from: ReadFrom::default(),
            ignore_hidden: true,
            order_by: OrderBy::default(),
            buf_size: 4096,
        }
    }
}

impl TrackerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.log_path.as_os_str().is_empty() {
            return Err("log_path cannot be empty".to_string());
        }

        if self.buf_size == 0 {
            return Err("reader_buf_size must be positive".to_string());
        }

        Ok(())
    }
}
