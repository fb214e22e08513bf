// SPDX-License-Identifier: Apache-2.0

//! Configuration for the file reader.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::init::parse::parse_bool_value;
use crate::receivers::file::decoder::DEFAULT_ENCODING;
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::input::{Mode, OrderBy, ReadFrom, TrackerConfig};

pub const DEFAULT_BUF_SIZE: usize = 4096;
pub const DEFAULT_SYNC_EVERY: u64 = 10;
pub const DEFAULT_MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_IDLE_FLUSH_POLLS: u32 = 4;

/// Configuration keys understood by [`ReaderConfig::from_map`]
pub mod keys {
    pub const MODE: &str = "mode";
    pub const LOG_PATH: &str = "log_path";
    pub const META_PATH: &str = "meta_path";
    pub const READER_BUF_SIZE: &str = "reader_buf_size";
    pub const ENCODING: &str = "encoding";
    pub const HEAD_PATTERN: &str = "head_pattern";
    pub const READ_FROM: &str = "read_from";
    pub const SYNC_EVERY: &str = "sync_every";
    pub const IGNORE_HIDDEN: &str = "ignore_hidden";
    pub const RUN_TIME: &str = "run_time";
    pub const VALID_FILE_PATH: &str = "valid_file_path";
    pub const ORDER_BY: &str = "order_by";
    pub const IDLE_FLUSH_POLLS: &str = "idle_flush_polls";
    pub const MAX_RECORD_SIZE: &str = "max_record_size";
}

/// Configuration for one [`FileBufReader`](crate::receivers::file::FileBufReader)
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    /// Single file or directory
    pub mode: Mode,
    /// Root file or directory
    pub log_path: PathBuf,
    /// Directory holding the checkpoint; in-memory only when unset
    pub meta_path: Option<PathBuf>,
    /// Bytes per raw read
    pub reader_buf_size: usize,
    /// Source encoding
    pub encoding: String,
    /// Regex marking the first line of a record; one line per record when unset
    pub head_pattern: Option<String>,
    /// Start position for sources without a checkpoint
    pub read_from: ReadFrom,
    /// Delivered records between automatic checkpoint saves, 0 to disable
    pub sync_every: u64,
    /// Skip dotfiles in directory mode
    pub ignore_hidden: bool,
    /// Daily read window, e.g. "22-6"
    pub run_time: Option<String>,
    /// Fail construction if log_path does not exist
    pub valid_file_path: bool,
    /// Directory ordering
    pub order_by: OrderBy,
    /// Consecutive empty polls before a pending record is flushed, 0 to never flush on idle
    pub idle_flush_polls: u32,
    /// Largest record (and physical line) kept in one piece
    pub max_record_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            log_path: PathBuf::new(),
            meta_path: None,
            reader_buf_size: DEFAULT_BUF_SIZE,
            encoding: DEFAULT_ENCODING.to_string(),
            head_pattern: None,
            read_from: ReadFrom::default(),
            sync_every: DEFAULT_SYNC_EVERY,
            ignore_hidden: true,
            run_time: None,
            valid_file_path: false,
            order_by: OrderBy::default(),
            idle_flush_polls: DEFAULT_IDLE_FLUSH_POLLS,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl ReaderConfig {
    pub fn new(mode: Mode, log_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            log_path: log_path.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.tracker_config().validate()?;

        if self.max_record_size == 0 {
            return Err("max_record_size must be positive".to_string());
        }

        Ok(())
    }

    /// The part of the configuration the source tracker needs
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            mode: self.mode,
            log_path: self.log_path.clone(),
            read_from: self.read_from,
            ignore_hidden: self.ignore_hidden,
            order_by: self.order_by,
            buf_size: self.reader_buf_size,
        }
    }

    /// Build from string key/values such as `"reader_buf_size" => "24"`.
    ///
    /// Unknown keys are ignored so one map can carry settings for other components.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get(keys::MODE) {
            config.mode = v.parse().map_err(Error::Config)?;
        }
        match get(keys::LOG_PATH) {
            Some(v) => config.log_path = PathBuf::from(v),
            None => return Err(Error::Config(format!("`{}` is required", keys::LOG_PATH))),
        }
        config.meta_path = get(keys::META_PATH).map(PathBuf::from);
        if let Some(v) = get(keys::READER_BUF_SIZE) {
            config.reader_buf_size = parse_number(keys::READER_BUF_SIZE, v)?;
        }
        if let Some(v) = get(keys::ENCODING) {
            config.encoding = v.to_string();
        }
        config.head_pattern = get(keys::HEAD_PATTERN).map(str::to_string);
        if let Some(v) = get(keys::READ_FROM) {
            config.read_from = v.parse().map_err(Error::Config)?;
        }
        if let Some(v) = get(keys::SYNC_EVERY) {
            config.sync_every = parse_number(keys::SYNC_EVERY, v)?;
        }
        if let Some(v) = get(keys::IGNORE_HIDDEN) {
            config.ignore_hidden = parse_flag(keys::IGNORE_HIDDEN, v)?;
        }
        config.run_time = get(keys::RUN_TIME).map(str::to_string);
        if let Some(v) = get(keys::VALID_FILE_PATH) {
            config.valid_file_path = parse_flag(keys::VALID_FILE_PATH, v)?;
        }
        if let Some(v) = get(keys::ORDER_BY) {
            config.order_by = v.parse().map_err(Error::Config)?;
        }
        if let Some(v) = get(keys::IDLE_FLUSH_POLLS) {
            config.idle_flush_polls = parse_number(keys::IDLE_FLUSH_POLLS, v)?;
        }
        if let Some(v) = get(keys::MAX_RECORD_SIZE) {
            config.max_record_size = parse_number(keys::MAX_RECORD_SIZE, v)?;
        }

        Ok(config)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("invalid value for `{}`: {} ({})", key, value, e)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    parse_bool_value(value).map_err(|e| Error::Config(format!("invalid value for `{}`: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::new(Mode::Dir, "/var/log/app");
        assert_eq!(config.reader_buf_size, 4096);
        assert_eq!(config.encoding, "utf-8");
        assert_eq!(config.sync_every, 10);
        assert_eq!(config.idle_flush_polls, DEFAULT_IDLE_FLUSH_POLLS);
        assert!(config.ignore_hidden);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_map() {
        let config = ReaderConfig::from_map(&map(&[
            ("log_path", "/logs"),
            ("meta_path", "/meta"),
            ("mode", "dir"),
            ("sync_every", "1"),
            ("ignore_hidden", "true"),
            ("reader_buf_size", "24"),
            ("read_from", "oldest"),
            ("head_pattern", "^test*"),
            ("run_time", "22-6"),
            ("encoding", "gbk"),
            ("order_by", "name"),
            ("datasource_tag", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.mode, Mode::Dir);
        assert_eq!(config.log_path, PathBuf::from("/logs"));
        assert_eq!(config.meta_path, Some(PathBuf::from("/meta")));
        assert_eq!(config.sync_every, 1);
        assert_eq!(config.reader_buf_size, 24);
        assert_eq!(config.head_pattern.as_deref(), Some("^test*"));
        assert_eq!(config.run_time.as_deref(), Some("22-6"));
        assert_eq!(config.encoding, "gbk");
        assert_eq!(config.order_by, OrderBy::Name);
    }

    #[test]
    fn test_from_map_errors() {
        assert!(matches!(
            ReaderConfig::from_map(&map(&[("mode", "dir")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ReaderConfig::from_map(&map(&[("log_path", "/x"), ("reader_buf_size", "big")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ReaderConfig::from_map(&map(&[("log_path", "/x"), ("ignore_hidden", "maybe")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ReaderConfig::from_map(&map(&[("log_path", "/x"), ("read_from", "middle")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = ReaderConfig::new(Mode::File, "/var/log/app.log");
        config.reader_buf_size = 0;
        assert!(config.validate().is_err());

        config.reader_buf_size = 1;
        config.max_record_size = 0;
        assert!(config.validate().is_err());
    }
}
