// SPDX-License-Identifier: Apache-2.0

//! File tailing for log collection.
//!
//! A [`FileBufReader`] follows one file or every file of a directory and hands out
//! one logical record per call. It decodes the configured encoding, groups
//! continuation lines under a head pattern, survives rename and copy-truncate
//! rotation, and resumes exactly where it left off from a checkpoint on disk.

pub mod assembler;
pub mod config;
pub mod decoder;
pub mod error;
pub mod input;
pub mod parser;
pub mod persistence;
pub mod reader;
pub mod time_gate;

pub use config::ReaderConfig;
pub use decoder::Decoder;
pub use error::{Error, Result};
pub use input::{FileId, Mode, OrderBy, ReadFrom};
pub use parser::{KeyValueParser, Parser};
pub use reader::{FileBufReader, Record, StatsInfo};
pub use time_gate::TimeGate;
