// SPDX-License-Identifier: Apache-2.0

//! Pull-based reader over one file or one directory of log files.
//!
//! [`FileBufReader`] composes the time gate, source tracker, decoder, record
//! assembler and checkpoint store. Every call returns promptly: `Ok(None)` means
//! nothing is available right now and the caller should poll again later.
//!
//! Delivery is at-least-once. The checkpoint never runs ahead of delivery, and
//! records assembled but not yet handed out are saved along with it.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::receivers::file::assembler::{RecordAssembler, classifier_for};
use crate::receivers::file::config::ReaderConfig;
use crate::receivers::file::decoder::Decoder;
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::input::{Event, FileId, Mode, SourceTracker, TrackerSeed};
use crate::receivers::file::persistence::{
    Checkpoint, CheckpointEntry, CheckpointStore, ReadyRecord,
};
use crate::receivers::file::time_gate::TimeGate;

/// One logical record and the source it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record bytes, line terminators included
    pub bytes: Vec<u8>,
    pub source: PathBuf,
    pub file_id: FileId,
}

impl Record {
    /// Text view, invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn into_string(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Cumulative error statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsInfo {
    pub errors: u64,
    pub last_error: String,
}

impl StatsInfo {
    fn record(&mut self, e: &Error) {
        self.errors += 1;
        self.last_error = e.to_string();
    }
}

pub struct FileBufReader {
    inner: Mutex<Inner>,
    closed: AtomicBool,
    log_path: PathBuf,
}

struct Inner {
    config: ReaderConfig,
    gate: TimeGate,
    tracker: SourceTracker,
    decoder: Decoder,
    assembler: RecordAssembler,
    store: CheckpointStore,
    /// Source of the lines currently held by the assembler
    origin: Option<(PathBuf, FileId)>,
    ready: VecDeque<Record>,
    last_source: Option<PathBuf>,
    delivered_since_sync: u64,
    idle_polls: u32,
    stats: StatsInfo,
}

impl FileBufReader {
    /// Build a reader, validating the path only if `config.valid_file_path` is set.
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let strict = config.valid_file_path;
        Self::open(config, strict)
    }

    /// Build a reader; with `valid_file_path` a missing log path fails immediately.
    pub fn open(config: ReaderConfig, valid_file_path: bool) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        if valid_file_path || config.valid_file_path {
            check_log_path(&config)?;
        }

        let gate = TimeGate::from_config(config.run_time.as_deref())?;
        let classifier = classifier_for(config.head_pattern.as_deref())?;
        let decoder = Decoder::new(&config.encoding);

        let scope = config.log_path.to_string_lossy().into_owned();
        let store = CheckpointStore::open(config.meta_path.as_deref(), &scope)?;
        let checkpoint = store.load()?;

        let seed = checkpoint.as_ref().map(|c| TrackerSeed {
            offsets: c
                .files
                .values()
                .map(|e| (e.file_id(), e.offset))
                .collect(),
            current: c.current.as_deref().and_then(|k| k.parse().ok()),
        });
        let tracker =
            SourceTracker::new(config.tracker_config(), config.max_record_size, seed)?;

        let assembler = RecordAssembler::new(classifier, config.max_record_size);

        let mut inner = Inner {
            gate,
            tracker,
            decoder,
            assembler,
            store,
            origin: None,
            ready: VecDeque::new(),
            last_source: None,
            delivered_since_sync: 0,
            idle_polls: 0,
            stats: StatsInfo::default(),
            config,
        };
        if let Some(checkpoint) = checkpoint {
            inner.restore(checkpoint);
        }

        debug!(
            path = ?inner.config.log_path,
            mode = ?inner.config.mode,
            encoding = inner.decoder.name(),
            head_pattern = ?inner.config.head_pattern,
            "Created file reader"
        );

        let log_path = inner.config.log_path.clone();
        Ok(Self {
            inner: Mutex::new(inner),
            closed: AtomicBool::new(false),
            log_path,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Root path this reader was built for
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Next record with its exact bytes and source.
    pub fn read_record(&self) -> Result<Option<Record>> {
        self.ensure_open()?;
        let mut inner = self.lock();
        self.ensure_open()?;
        inner.next_record()
    }

    /// Next record as text; `Ok(None)` when nothing is available right now.
    pub fn read_line(&self) -> Result<Option<String>> {
        Ok(self.read_record()?.map(Record::into_string))
    }

    /// Like [`read_line`](Self::read_line), for readers configured with a head pattern.
    pub fn read_pattern(&self) -> Result<Option<String>> {
        self.ensure_open()?;
        if !self.lock().assembler.is_multiline() {
            return Err(Error::Config(
                "read_pattern requires a head_pattern".to_string(),
            ));
        }
        self.read_line()
    }

    /// Switch to multi-line mode with `pattern` marking the first line of a record.
    pub fn set_head_pattern(&self, pattern: &str) -> Result<()> {
        self.ensure_open()?;
        let classifier = classifier_for(Some(pattern))?;
        let mut inner = self.lock();
        inner.assembler.set_classifier(classifier);
        inner.config.head_pattern = Some(pattern.to_string());
        info!(head_pattern = pattern, "Switched to head pattern mode");
        Ok(())
    }

    /// Path of the file that produced the most recently returned record
    pub fn source(&self) -> Option<PathBuf> {
        self.lock().last_source.clone()
    }

    /// Save the checkpoint now. A no-op once closed, since closing saves it.
    pub fn sync_meta(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut inner = self.lock();
        let result = inner.sync();
        if let Err(e) = &result {
            inner.stats.record(e);
        }
        result
    }

    /// Save the checkpoint and release every file handle. Later reads fail with
    /// [`Error::Closed`]; closing twice is harmless.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut inner = self.lock();
        let result = inner.sync();
        if let Err(e) = &result {
            warn!(path = ?self.log_path, error = %e, "Failed to save checkpoint on close");
            inner.stats.record(e);
        }
        inner.tracker.close();
        debug!(path = ?self.log_path, "Closed file reader");
        result
    }

    pub fn status(&self) -> StatsInfo {
        self.lock().stats.clone()
    }
}

impl std::fmt::Debug for FileBufReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBufReader")
            .field("log_path", &self.log_path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn check_log_path(config: &ReaderConfig) -> Result<()> {
    let metadata = match std::fs::metadata(&config.log_path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(config.log_path.clone()));
        }
        Err(e) => return Err(e.into()),
    };
    if config.mode == Mode::Dir && !metadata.is_dir() {
        return Err(Error::Config(format!(
            "log_path {:?} is not a directory",
            config.log_path
        )));
    }
    Ok(())
}

impl Inner {
    /// Seed in-memory state from a loaded checkpoint.
    fn restore(&mut self, checkpoint: Checkpoint) {
        for r in checkpoint.ready {
            self.ready.push_back(Record {
                bytes: r.data,
                source: PathBuf::from(r.path),
                file_id: FileId::new(r.dev, r.ino),
            });
        }

        let current = self.tracker.current().map(|(p, id)| (p.to_path_buf(), id));
        for entry in checkpoint.files.into_values() {
            if entry.pending.is_empty() {
                continue;
            }
            let id = entry.file_id();
            match &current {
                Some((path, current_id))
                    if *current_id == id && !self.tracker.was_restarted(id) =>
                {
                    info!(
                        path = ?path,
                        file_id = %id,
                        pending = entry.pending.len(),
                        "Restored partial record"
                    );
                    self.assembler.restore_pending(entry.pending);
                    self.origin = Some((path.clone(), id));
                }
                _ => {
                    // Source gone or truncated while stopped: its partial record is final
                    info!(path = %entry.path, file_id = %id, "Flushing partial record of ended source");
                    self.ready.push_back(Record {
                        bytes: entry.pending,
                        source: PathBuf::from(entry.path),
                        file_id: id,
                    });
                }
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.gate.is_permitted_now() {
            return Ok(None);
        }

        loop {
            if let Some(record) = self.ready.pop_front() {
                self.delivered(&record);
                return Ok(Some(record));
            }

            let event = match self.tracker.poll() {
                Ok(event) => event,
                Err(e) => {
                    self.stats.record(&e);
                    return Err(e);
                }
            };

            match event {
                Event::Line(raw) => {
                    self.idle_polls = 0;
                    if let Some((path, id)) = self.tracker.current() {
                        let origin = (path.to_path_buf(), id);
                        self.push_line(&raw, origin);
                    }
                }
                Event::SourceEnd {
                    tail,
                    path,
                    file_id,
                    state,
                } => {
                    self.idle_polls = 0;
                    debug!(path = ?path, file_id = %file_id, state = ?state, "Source ended");
                    let origin = (path, file_id);
                    if let Some(tail) = tail {
                        self.push_line(&tail, origin.clone());
                    } else if self.origin.is_none() {
                        self.origin = Some(origin);
                    }
                    self.assembler.flush();
                    self.collect();
                }
                Event::Exhausted => {
                    self.idle_polls = self.idle_polls.saturating_add(1);
                    let threshold = self.config.idle_flush_polls;
                    if threshold > 0 && self.idle_polls >= threshold && self.assembler.flush() {
                        self.idle_polls = 0;
                        self.collect();
                        continue;
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn push_line(&mut self, raw: &[u8], origin: (PathBuf, FileId)) {
        let text = self.decoder.decode(raw);
        self.assembler.push_line(&text);
        self.origin = Some(origin);
        self.collect();
    }

    /// Move completed records out of the assembler, tagged with their source.
    fn collect(&mut self) {
        while let Some(bytes) = self.assembler.pop_record() {
            let (source, file_id) = match &self.origin {
                Some((path, id)) => (path.clone(), *id),
                None => (self.config.log_path.clone(), FileId::default()),
            };
            self.ready.push_back(Record {
                bytes,
                source,
                file_id,
            });
        }
    }

    fn delivered(&mut self, record: &Record) {
        self.last_source = Some(record.source.clone());
        self.delivered_since_sync += 1;

        let every = self.config.sync_every;
        if every > 0 && self.delivered_since_sync >= every {
            if let Err(e) = self.sync() {
                warn!(path = ?self.config.log_path, error = %e, "Automatic checkpoint failed");
                self.stats.record(&e);
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        let mut checkpoint = Checkpoint::default();
        for source in self.tracker.snapshot() {
            checkpoint.insert(CheckpointEntry {
                path: source.path.to_string_lossy().into_owned(),
                filename: source
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                dev: source.file_id.dev(),
                ino: source.file_id.ino(),
                offset: source.offset,
                pending: Vec::new(),
            });
        }
        checkpoint.current = self.tracker.current().map(|(_, id)| id.to_key());

        let mut ready: Vec<ReadyRecord> = self.ready.iter().map(ready_record).collect();
        if self.assembler.has_pending() {
            let pending = self.assembler.pending().to_vec();
            let entry = self
                .origin
                .as_ref()
                .and_then(|(_, id)| checkpoint.files.get_mut(&id.to_key()));
            match entry {
                Some(entry) => entry.pending = pending,
                None => {
                    // No tracked source to resume it with; deliver it as is after restart
                    let (path, id) = match &self.origin {
                        Some((p, id)) => (p.clone(), *id),
                        None => (self.config.log_path.clone(), FileId::default()),
                    };
                    ready.push(ready_record(&Record {
                        bytes: pending,
                        source: path,
                        file_id: id,
                    }));
                }
            }
        }
        checkpoint.ready = ready;
        checkpoint
    }

    fn sync(&mut self) -> Result<()> {
        let checkpoint = self.checkpoint();
        self.store.save(&checkpoint)?;
        self.delivered_since_sync = 0;
        Ok(())
    }
}

fn ready_record(record: &Record) -> ReadyRecord {
    ReadyRecord {
        path: record.source.to_string_lossy().into_owned(),
        dev: record.file_id.dev(),
        ino: record.file_id.ino(),
        data: record.bytes.clone(),
    }
}
