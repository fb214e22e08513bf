// SPDX-License-Identifier: Apache-2.0

pub mod file;

pub use file::{
    Event, FileFinder, FileId, FileReader, Mode, OrderBy, ReadFrom, SourceOffset, SourceState,
    SourceTracker, TrackerConfig, TrackerSeed,
};
