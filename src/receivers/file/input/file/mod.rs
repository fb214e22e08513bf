// SPDX-License-Identifier: Apache-2.0

mod config;
mod file_id;
mod finder;
mod reader;
mod tracker;

pub use config::{Mode, OrderBy, ReadFrom, TrackerConfig};
pub use file_id::{FileId, get_path_from_file};
pub use finder::FileFinder;
pub use reader::{FileReader, SourceState};
pub use tracker::{Event, SourceOffset, SourceTracker, TrackerSeed};
