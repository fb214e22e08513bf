// SPDX-License-Identifier: Apache-2.0

//! Source tracking for one file or one directory.
//!
//! The tracker owns the [`FileReader`]s, decides which one is current, and turns
//! rotation, truncation and removal into [`Event::SourceEnd`] so the caller can
//! finalize whatever record was pending for the source that just ended.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::config::{Mode, ReadFrom, TrackerConfig};
use super::file_id::FileId;
use super::finder::FileFinder;
use super::reader::{FileReader, SourceState};
use crate::receivers::file::error::{Error, Result};

/// What one poll of the tracker produced
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// A complete physical line from the current source
    Line(Vec<u8>),
    /// The current source ended or restarted; anything pending for it is final
    SourceEnd {
        /// Unterminated bytes left at the end of the source
        tail: Option<Vec<u8>>,
        path: PathBuf,
        file_id: FileId,
        state: SourceState,
    },
    /// Nothing new right now
    Exhausted,
}

/// Offsets restored from a checkpoint
#[derive(Debug, Clone, Default)]
pub struct TrackerSeed {
    pub offsets: HashMap<FileId, u64>,
    /// Source that was current when the checkpoint was taken
    pub current: Option<FileId>,
}

/// Position of one source, as recorded in checkpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOffset {
    pub file_id: FileId,
    pub path: PathBuf,
    pub offset: u64,
}

#[derive(Debug)]
pub struct SourceTracker {
    config: TrackerConfig,
    finder: Option<FileFinder>,
    /// Front is the current source; later entries wait in traversal order
    sources: VecDeque<FileReader>,
    /// Sources already traversed in directory mode
    passed: Vec<SourceOffset>,
    known: HashSet<FileId>,
    restored: HashMap<FileId, u64>,
    /// Restored sources that shrank below their checkpoint offset while stopped
    restarted: HashSet<FileId>,
    /// Whether any checkpoint existed at startup
    resumed: bool,
    max_line_size: usize,
}

impl SourceTracker {
    pub fn new(
        config: TrackerConfig,
        max_line_size: usize,
        seed: Option<TrackerSeed>,
    ) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let finder = match config.mode {
            Mode::Dir => Some(FileFinder::new(
                &config.log_path,
                config.ignore_hidden,
                config.order_by,
            )?),
            Mode::File => None,
        };

        let resumed = seed.is_some();
        let seed = seed.unwrap_or_default();

        let mut tracker = Self {
            config,
            finder,
            sources: VecDeque::new(),
            passed: Vec::new(),
            known: HashSet::new(),
            restored: seed.offsets,
            restarted: HashSet::new(),
            resumed,
            max_line_size,
        };

        match tracker.config.mode {
            Mode::File => tracker.init_file()?,
            Mode::Dir => tracker.init_dir(seed.current)?,
        }

        Ok(tracker)
    }

    fn init_file(&mut self) -> Result<()> {
        let path = self.config.log_path.clone();
        match FileId::from_path(&path) {
            Ok(id) => {
                let reader = self.open_source(&path, id, true)?;
                self.push_source(reader);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?path, "Source does not exist yet");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn init_dir(&mut self, current: Option<FileId>) -> Result<()> {
        let found = self.enumerate()?;
        if found.is_empty() {
            debug!(path = ?self.config.log_path, "No sources found in directory");
            return Ok(());
        }

        let start = match current.and_then(|c| found.iter().position(|(_, id)| *id == c)) {
            Some(idx) => idx,
            None => match found.iter().rposition(|(_, id)| self.restored.contains_key(id)) {
                Some(idx) => idx,
                None if self.resumed => 0,
                None => match self.config.read_from {
                    ReadFrom::Oldest => 0,
                    ReadFrom::Newest => found.len() - 1,
                },
            },
        };

        for (idx, (path, id)) in found.into_iter().enumerate() {
            if idx < start {
                debug!(path = ?path, file_id = %id, "Skipping source before resume point");
                let offset = self.restored.remove(&id).unwrap_or(0);
                self.known.insert(id);
                self.passed.push(SourceOffset {
                    file_id: id,
                    path,
                    offset,
                });
                continue;
            }
            let reader = self.open_source(&path, id, idx == start)?;
            self.push_source(reader);
        }
        Ok(())
    }

    /// Regular files under the directory as (path, id), in traversal order.
    fn enumerate(&self) -> Result<Vec<(PathBuf, FileId)>> {
        let finder = match &self.finder {
            Some(f) => f,
            None => return Ok(Vec::new()),
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for path in finder.find_files()? {
            match FileId::from_path(&path) {
                // Hard links share an identity; only the first path is tailed
                Ok(id) if seen.insert(id) => found.push((path, id)),
                Ok(_) => {}
                Err(e) => debug!(path = ?path, error = %e, "Skipping unreadable source"),
            }
        }
        Ok(found)
    }

    /// Build a reader positioned by checkpoint or read-from policy.
    ///
    /// The read-from policy only applies to the first source of a fresh start;
    /// anything discovered later is new content and starts at the beginning.
    fn open_source(&mut self, path: &Path, id: FileId, first: bool) -> Result<FileReader> {
        let mut reader = FileReader::new(
            path,
            id,
            0,
            self.config.buf_size,
            self.max_line_size,
        );

        if let Some(offset) = self.restored.remove(&id) {
            let len = std::fs::metadata(path)?.len();
            if offset > len {
                warn!(
                    path = ?path,
                    file_id = %id,
                    offset,
                    len,
                    "Checkpoint offset is past end of file, restarting source from the beginning"
                );
                self.restarted.insert(id);
            } else {
                info!(path = ?path, file_id = %id, offset, "Resuming source from checkpoint");
                reader.reset_to(offset)?;
            }
        } else if first && !self.resumed && self.config.read_from == ReadFrom::Newest {
            reader.seek_to_end()?;
            debug!(path = ?path, file_id = %id, offset = reader.offset(), "Starting source at end");
        }

        Ok(reader)
    }

    fn push_source(&mut self, reader: FileReader) {
        debug!(path = ?reader.path(), file_id = %reader.file_id(), "Tracking source");
        self.known.insert(reader.file_id());
        self.sources.push_back(reader);
    }

    /// Append newly discovered directory entries to the tail of the traversal.
    fn refresh(&mut self) -> Result<()> {
        let found = self.enumerate()?;

        let present: HashSet<FileId> = found.iter().map(|(_, id)| *id).collect();
        self.passed.retain(|p| present.contains(&p.file_id));
        // A vanished identity may be handed to the next new file
        let sources = &self.sources;
        self.known
            .retain(|id| present.contains(id) || sources.iter().any(|s| s.file_id() == *id));

        for (path, id) in found {
            if self.known.contains(&id) {
                continue;
            }
            let reader = self.open_source(&path, id, false)?;
            info!(path = ?path, file_id = %id, "Discovered new source");
            self.push_source(reader);
        }
        Ok(())
    }

    /// Advance the tracker by one step.
    pub fn poll(&mut self) -> Result<Event> {
        match self.config.mode {
            Mode::File => self.poll_file(),
            Mode::Dir => self.poll_dir(),
        }
    }

    /// Next line from the current source, `None` once it has nothing more.
    fn next_from_current(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(current) = self.sources.front_mut() else {
            return Ok(None);
        };
        match current.next_line() {
            Ok(line) => Ok(line),
            // The path was replaced or removed before we could open it
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Finish the current source and report its end.
    fn end_current(&mut self, state: SourceState) -> Event {
        let Some(mut current) = self.sources.pop_front() else {
            return Event::Exhausted;
        };
        let tail = current.take_tail();
        let moved_to = match state {
            SourceState::Rotated => current.current_path(),
            _ => None,
        };
        current.finish(state);

        let (path, file_id) = (current.path().to_path_buf(), current.file_id());
        match state {
            SourceState::Removed => {
                info!(path = ?path, file_id = %file_id, "Source removed");
                self.known.remove(&file_id);
            }
            SourceState::Rotated => {
                info!(path = ?path, file_id = %file_id, moved_to = ?moved_to, "Source rotated")
            }
            _ => {
                debug!(path = ?path, file_id = %file_id, offset = current.offset(), "Source finished");
                self.passed.push(SourceOffset {
                    file_id,
                    path: path.clone(),
                    offset: current.offset(),
                });
            }
        }

        Event::SourceEnd {
            tail,
            path,
            file_id,
            state,
        }
    }

    /// Restart a copy-truncated source from the beginning.
    fn restart_truncated(&mut self) -> Result<Event> {
        let Some(current) = self.sources.front_mut() else {
            return Ok(Event::Exhausted);
        };
        warn!(
            path = ?current.path(),
            file_id = %current.file_id(),
            offset = current.offset(),
            "Source truncated, reading from the beginning"
        );
        let tail = current.take_tail();
        current.reset_to(0)?;
        Ok(Event::SourceEnd {
            tail,
            path: current.path().to_path_buf(),
            file_id: current.file_id(),
            state: SourceState::Active,
        })
    }

    fn poll_file(&mut self) -> Result<Event> {
        if self.sources.is_empty() {
            let path = self.config.log_path.clone();
            match FileId::from_path(&path) {
                Ok(id) => {
                    info!(path = ?path, file_id = %id, "Source appeared");
                    let reader = self.open_source(&path, id, false)?;
                    self.push_source(reader);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Event::Exhausted),
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(line) = self.next_from_current()? {
            return Ok(Event::Line(line));
        }

        let Some(current_id) = self.sources.front().map(|s| s.file_id()) else {
            return Ok(Event::Exhausted);
        };

        match FileId::from_path(&self.config.log_path) {
            Ok(id) if id == current_id => {
                if self.current_truncated()? {
                    return self.restart_truncated();
                }
                Ok(Event::Exhausted)
            }
            Ok(id) => {
                let event = self.end_current(SourceState::Rotated);
                let path = self.config.log_path.clone();
                let reader = self.open_source(&path, id, false)?;
                info!(path = ?path, file_id = %id, "Following rotated source");
                self.push_source(reader);
                Ok(event)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(self.end_current(SourceState::Removed))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn poll_dir(&mut self) -> Result<Event> {
        if self.sources.is_empty() {
            self.refresh()?;
        }

        if let Some(line) = self.next_from_current()? {
            return Ok(Event::Line(line));
        }

        self.refresh()?;
        if self.sources.len() > 1 {
            return Ok(self.end_current(SourceState::Exhausted));
        }

        let Some(current_id) = self.sources.front().map(|s| s.file_id()) else {
            return Ok(Event::Exhausted);
        };
        let current_path = self.sources[0].path().to_path_buf();

        match FileId::from_path(&current_path) {
            Ok(id) if id == current_id => {
                if self.current_truncated()? {
                    return self.restart_truncated();
                }
                Ok(Event::Exhausted)
            }
            Ok(_) => Ok(self.end_current(SourceState::Rotated)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(self.end_current(SourceState::Removed))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn current_truncated(&self) -> Result<bool> {
        match self.sources.front() {
            Some(current) => Ok(current.is_truncated()?),
            None => Ok(false),
        }
    }

    /// Path and identity of the current source
    pub fn current(&self) -> Option<(&Path, FileId)> {
        self.sources.front().map(|s| (s.path(), s.file_id()))
    }

    /// Positions of every tracked source, traversed ones included.
    pub fn snapshot(&self) -> Vec<SourceOffset> {
        self.passed
            .iter()
            .cloned()
            .chain(self.sources.iter().map(|s| SourceOffset {
                file_id: s.file_id(),
                path: s.path().to_path_buf(),
                offset: s.offset(),
            }))
            .collect()
    }

    /// Whether `id` was restarted from 0 because it was truncated while stopped.
    /// Anything saved for it alongside the old offset no longer lines up.
    pub fn was_restarted(&self, id: FileId) -> bool {
        self.restarted.contains(&id)
    }

    /// Release every open handle.
    pub fn close(&mut self) {
        for source in self.sources.iter_mut() {
            source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::file::input::file::config::OrderBy;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn file_config(path: &Path) -> TrackerConfig {
        TrackerConfig {
            mode: Mode::File,
            log_path: path.to_path_buf(),
            buf_size: 8,
            ..Default::default()
        }
    }

    fn dir_config(path: &Path) -> TrackerConfig {
        TrackerConfig {
            mode: Mode::Dir,
            log_path: path.to_path_buf(),
            order_by: OrderBy::Name,
            buf_size: 8,
            ..Default::default()
        }
    }

    fn tracker(config: TrackerConfig) -> SourceTracker {
        SourceTracker::new(config, 1024 * 1024, None).unwrap()
    }

    /// Poll until exhausted, rendering events as strings
    fn drain(tracker: &mut SourceTracker) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..100 {
            match tracker.poll().unwrap() {
                Event::Line(line) => out.push(String::from_utf8(line).unwrap()),
                Event::SourceEnd { tail, path, .. } => out.push(format!(
                    "<end {} {}>",
                    path.file_name().unwrap().to_string_lossy(),
                    String::from_utf8(tail.unwrap_or_default()).unwrap()
                )),
                Event::Exhausted => return out,
            }
        }
        panic!("tracker never exhausted");
    }

    fn append(path: &Path, data: &str) {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    #[test]
    fn test_file_mode_reads_and_waits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\nb\n").unwrap();

        let mut t = tracker(file_config(&path));
        assert_eq!(drain(&mut t), vec!["a\n", "b\n"]);
        assert!(drain(&mut t).is_empty());

        append(&path, "c\n");
        assert_eq!(drain(&mut t), vec!["c\n"]);
    }

    #[test]
    fn test_file_mode_rotation_by_rename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old 1\n").unwrap();

        let mut t = tracker(file_config(&path));
        assert_eq!(drain(&mut t), vec!["old 1\n"]);

        // writer finishes the old file after it was renamed
        append(&path, "old 2\nold tail");
        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        fs::write(&path, "new 1\n").unwrap();

        assert_eq!(
            drain(&mut t),
            vec!["old 2\n", "<end app.log old tail>", "new 1\n"]
        );
    }

    #[test]
    fn test_file_mode_removal_and_reappearance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "one\n").unwrap();

        let mut t = tracker(file_config(&path));
        assert_eq!(drain(&mut t), vec!["one\n"]);

        fs::remove_file(&path).unwrap();
        assert_eq!(drain(&mut t), vec!["<end app.log >"]);
        assert!(t.current().is_none());
        assert!(drain(&mut t).is_empty());

        fs::write(&path, "two\n").unwrap();
        assert_eq!(drain(&mut t), vec!["two\n"]);
    }

    #[test]
    fn test_file_mode_truncation_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "first line\nsecond line\n").unwrap();

        let mut t = tracker(file_config(&path));
        assert_eq!(drain(&mut t).len(), 2);

        fs::write(&path, "x\n").unwrap();
        assert_eq!(drain(&mut t), vec!["<end app.log >", "x\n"]);
    }

    #[test]
    fn test_file_mode_newest_starts_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "history\n").unwrap();

        let config = TrackerConfig {
            read_from: ReadFrom::Newest,
            ..file_config(&path)
        };
        let mut t = tracker(config);
        assert!(drain(&mut t).is_empty());

        append(&path, "live\n");
        assert_eq!(drain(&mut t), vec!["live\n"]);
    }

    #[test]
    fn test_dir_mode_traverses_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f2"), "b1\n").unwrap();
        fs::write(dir.path().join("f1"), "a1\na2\n").unwrap();

        let mut t = tracker(dir_config(dir.path()));
        assert_eq!(drain(&mut t), vec!["a1\n", "a2\n", "<end f1 >", "b1\n"]);
        assert_eq!(t.current().unwrap().0, dir.path().join("f2"));

        fs::write(dir.path().join("f3"), "c1\n").unwrap();
        assert_eq!(drain(&mut t), vec!["<end f2 >", "c1\n"]);
    }

    #[test]
    fn test_dir_mode_newest_skips_earlier_sources() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f1"), "a\n").unwrap();
        fs::write(dir.path().join("f2"), "b\n").unwrap();

        let config = TrackerConfig {
            read_from: ReadFrom::Newest,
            ..dir_config(dir.path())
        };
        let mut t = tracker(config);
        assert!(drain(&mut t).is_empty());

        append(&dir.path().join("f2"), "b2\n");
        fs::write(dir.path().join("f3"), "c\n").unwrap();
        assert_eq!(drain(&mut t), vec!["b2\n", "<end f2 >", "c\n"]);
    }

    #[test]
    fn test_dir_mode_resume_from_seed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f1"), "a\n").unwrap();
        fs::write(dir.path().join("f2"), "b1\nb2\n").unwrap();
        fs::write(dir.path().join("f3"), "c\n").unwrap();

        let f2 = FileId::from_path(dir.path().join("f2")).unwrap();
        let seed = TrackerSeed {
            offsets: HashMap::from([(f2, 3)]),
            current: Some(f2),
        };
        let mut t = SourceTracker::new(dir_config(dir.path()), 1024, Some(seed)).unwrap();
        assert_eq!(drain(&mut t), vec!["b2\n", "<end f2 >", "c\n"]);

        let snapshot = t.snapshot();
        let names: Vec<_> = snapshot
            .iter()
            .map(|s| (s.path.file_name().unwrap().to_string_lossy().into_owned(), s.offset))
            .collect();
        assert_eq!(
            names,
            vec![
                ("f1".to_string(), 0),
                ("f2".to_string(), 6),
                ("f3".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_restored_offset_past_end_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "short\n").unwrap();

        let id = FileId::from_path(&path).unwrap();
        let seed = TrackerSeed {
            offsets: HashMap::from([(id, 1000)]),
            current: Some(id),
        };
        let mut t = SourceTracker::new(file_config(&path), 1024, Some(seed)).unwrap();
        assert!(t.was_restarted(id));
        assert_eq!(drain(&mut t), vec!["short\n"]);
    }

    #[test]
    fn test_restored_offset_within_file_is_not_a_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\nb\n").unwrap();

        let id = FileId::from_path(&path).unwrap();
        let seed = TrackerSeed {
            offsets: HashMap::from([(id, 2)]),
            current: Some(id),
        };
        let mut t = SourceTracker::new(file_config(&path), 1024, Some(seed)).unwrap();
        assert!(!t.was_restarted(id));
        assert_eq!(drain(&mut t), vec!["b\n"]);
    }

    #[test]
    fn test_dir_mode_reads_new_file_with_recycled_identity() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f1"), "a\n").unwrap();
        fs::write(dir.path().join("f2"), "b\n").unwrap();

        let mut t = tracker(dir_config(dir.path()));
        assert_eq!(drain(&mut t), vec!["a\n", "<end f1 >", "b\n"]);

        let removed = FileId::from_path(dir.path().join("f1")).unwrap();
        fs::remove_file(dir.path().join("f1")).unwrap();
        assert!(drain(&mut t).is_empty());
        assert!(!t.known.contains(&removed));

        // The filesystem usually hands the freed inode to one of these
        let mut expected = Vec::new();
        for i in 0..8 {
            let name = format!("g{:02}", i);
            fs::write(dir.path().join(&name), format!("new{}\n", i)).unwrap();
            expected.push(format!("new{}\n", i));
        }

        let lines: Vec<String> = drain(&mut t)
            .into_iter()
            .filter(|l| !l.starts_with("<end"))
            .collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_dir_mode_hidden_files_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".secret"), "hidden\n").unwrap();
        fs::write(dir.path().join("visible"), "shown\n").unwrap();

        let mut t = tracker(dir_config(dir.path()));
        assert_eq!(drain(&mut t), vec!["shown\n"]);
    }

    #[test]
    fn test_close_releases_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\n").unwrap();

        let mut t = tracker(file_config(&path));
        drain(&mut t);
        t.close();
        assert!(t.sources.iter().all(|s| !s.is_open()));
    }
}
