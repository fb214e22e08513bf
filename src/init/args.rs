// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::init::parse;
use crate::receivers::file::config::{
    DEFAULT_BUF_SIZE, DEFAULT_IDLE_FLUSH_POLLS, DEFAULT_MAX_RECORD_SIZE, DEFAULT_SYNC_EVERY,
    ReaderConfig,
};
use crate::receivers::file::decoder::DEFAULT_ENCODING;
use crate::receivers::file::input::{Mode, OrderBy, ReadFrom};

/// Follow one file or every file in a directory
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeArg {
    /// Tail a single file, following rotation
    #[default]
    File,
    /// Tail the files of a directory in order
    Dir,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::File => Mode::File,
            ModeArg::Dir => Mode::Dir,
        }
    }
}

/// Where to start reading sources without a checkpoint
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadFromArg {
    /// Start at the beginning of the file
    #[default]
    Oldest,
    /// Start at the end of the file (tail mode)
    Newest,
}

impl From<ReadFromArg> for ReadFrom {
    fn from(r: ReadFromArg) -> Self {
        match r {
            ReadFromArg::Oldest => ReadFrom::Oldest,
            ReadFromArg::Newest => ReadFrom::Newest,
        }
    }
}

/// Directory traversal order
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderByArg {
    /// Oldest modification time first
    #[default]
    Modtime,
    /// File name
    Name,
}

impl From<OrderByArg> for OrderBy {
    fn from(o: OrderByArg) -> Self {
        match o {
            OrderByArg::Modtime => OrderBy::ModTime,
            OrderByArg::Name => OrderBy::Name,
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct TailArgs {
    /// File or directory to read
    #[arg(long, env = "TAILKIT_LOG_PATH")]
    pub log_path: PathBuf,

    /// Read a single file or a directory of files
    #[arg(value_enum, long, env = "TAILKIT_MODE", default_value = "file")]
    pub mode: ModeArg,

    /// Directory to store the checkpoint in; nothing is persisted when unset
    #[arg(long, env = "TAILKIT_META_PATH")]
    pub meta_path: Option<PathBuf>,

    /// Bytes requested per read
    #[arg(long, env = "TAILKIT_READER_BUF_SIZE", default_value_t = DEFAULT_BUF_SIZE)]
    pub reader_buf_size: usize,

    /// Source encoding (any WHATWG label, or "nopanic" to pass bytes through)
    #[arg(long, env = "TAILKIT_ENCODING", default_value = DEFAULT_ENCODING)]
    pub encoding: String,

    /// Regex matching the first line of a multi-line record
    #[arg(long, env = "TAILKIT_HEAD_PATTERN")]
    #[serde(deserialize_with = "parse::deser_into_string_opt")]
    pub head_pattern: Option<String>,

    /// Where to start reading sources without a checkpoint
    #[arg(value_enum, long, env = "TAILKIT_READ_FROM", default_value = "oldest")]
    pub read_from: ReadFromArg,

    /// Records delivered between automatic checkpoint saves (0 disables)
    #[arg(long, env = "TAILKIT_SYNC_EVERY", default_value_t = DEFAULT_SYNC_EVERY)]
    pub sync_every: u64,

    /// Skip hidden files in directory mode
    #[arg(long, env = "TAILKIT_IGNORE_HIDDEN", default_value = "true", action = clap::ArgAction::Set, value_parser = parse::parse_bool_value)]
    pub ignore_hidden: bool,

    /// Daily window during which reading is allowed, e.g. "22-6"
    #[arg(long, env = "TAILKIT_RUN_TIME")]
    #[serde(deserialize_with = "parse::deser_into_string_opt")]
    pub run_time: Option<String>,

    /// Fail at startup if the log path does not exist
    #[arg(long, env = "TAILKIT_VALID_FILE_PATH", default_value = "false", action = clap::ArgAction::Set, value_parser = parse::parse_bool_value)]
    pub valid_file_path: bool,

    /// Directory traversal order
    #[arg(value_enum, long, env = "TAILKIT_ORDER_BY", default_value = "modtime")]
    pub order_by: OrderByArg,

    /// Empty polls before a pending multi-line record is delivered (0 never)
    #[arg(long, env = "TAILKIT_IDLE_FLUSH_POLLS", default_value_t = DEFAULT_IDLE_FLUSH_POLLS)]
    pub idle_flush_polls: u32,

    /// Largest record kept in one piece, in bytes
    #[arg(long, env = "TAILKIT_MAX_RECORD_SIZE", default_value_t = DEFAULT_MAX_RECORD_SIZE)]
    pub max_record_size: usize,
}

impl Default for TailArgs {
    fn default() -> Self {
        Self {
            log_path: PathBuf::new(),
            mode: ModeArg::File,
            meta_path: None,
            reader_buf_size: DEFAULT_BUF_SIZE,
            encoding: DEFAULT_ENCODING.to_string(),
            head_pattern: None,
            read_from: ReadFromArg::Oldest,
            sync_every: DEFAULT_SYNC_EVERY,
            ignore_hidden: true,
            run_time: None,
            valid_file_path: false,
            order_by: OrderByArg::Modtime,
            idle_flush_polls: DEFAULT_IDLE_FLUSH_POLLS,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl TailArgs {
    /// Build the reader config from command line args
    pub fn build_config(&self) -> ReaderConfig {
        ReaderConfig {
            mode: self.mode.into(),
            log_path: self.log_path.clone(),
            meta_path: self.meta_path.clone(),
            reader_buf_size: self.reader_buf_size,
            encoding: self.encoding.clone(),
            head_pattern: self.head_pattern.clone().filter(|p| !p.is_empty()),
            read_from: self.read_from.into(),
            sync_every: self.sync_every,
            ignore_hidden: self.ignore_hidden,
            run_time: self.run_time.clone().filter(|r| !r.trim().is_empty()),
            valid_file_path: self.valid_file_path,
            order_by: self.order_by.into(),
            idle_flush_polls: self.idle_flush_polls,
            max_record_size: self.max_record_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        tail: TailArgs,
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tailkit", "--log-path", "/var/log/app.log"]).unwrap();
        let config = cli.tail.build_config();

        assert_eq!(config, ReaderConfig::new(Mode::File, "/var/log/app.log"));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "tailkit",
            "--log-path",
            "/var/log/app",
            "--mode",
            "dir",
            "--read-from",
            "newest",
            "--head-pattern",
            "^\\d{4}-",
            "--ignore-hidden",
            "false",
            "--order-by",
            "name",
            "--run-time",
            "22-6",
        ])
        .unwrap();
        let config = cli.tail.build_config();

        assert_eq!(config.mode, Mode::Dir);
        assert_eq!(config.read_from, ReadFrom::Newest);
        assert_eq!(config.head_pattern.as_deref(), Some("^\\d{4}-"));
        assert!(!config.ignore_hidden);
        assert_eq!(config.order_by, OrderBy::Name);
        assert_eq!(config.run_time.as_deref(), Some("22-6"));
    }

    #[test]
    fn test_deserialize_from_config_file() {
        let args: TailArgs = serde_json::from_value(serde_json::json!({
            "log_path": "/logs",
            "mode": "dir",
            "run_time": 10,
            "sync_every": 1
        }))
        .unwrap();
        let config = args.build_config();

        assert_eq!(config.mode, Mode::Dir);
        assert_eq!(config.run_time.as_deref(), Some("10"));
        assert_eq!(config.sync_every, 1);
        assert_eq!(config.reader_buf_size, DEFAULT_BUF_SIZE);
    }
}
