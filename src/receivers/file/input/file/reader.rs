// SPDX-License-Identifier: Apache-2.0

use memchr::memchr;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::file_id::{FileId, get_path_from_file};

/// Lifecycle of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// More bytes may be available
    Active,
    /// Everything currently in the file has been consumed
    Exhausted,
    /// The path now points at a different file
    Rotated,
    /// The path no longer exists
    Removed,
}

impl SourceState {
    /// Rotated and Removed sources are never read again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SourceState::Rotated | SourceState::Removed)
    }
}

/// FileReader reads one source in raw chunks and splits it into physical lines.
///
/// Lines are found by scanning raw bytes for `\n`, so line boundaries and offsets do
/// not depend on the chunk size. `offset` always points just past the last line
/// handed out; bytes read beyond it wait in the raw buffer.
pub struct FileReader {
    path: PathBuf,
    file_id: FileId,
    file: Option<File>,
    offset: u64,
    raw: Vec<u8>,
    start: usize,
    chunk: Vec<u8>,
    max_line_size: usize,
    state: SourceState,
}

impl FileReader {
    pub fn new(
        path: impl AsRef<Path>,
        file_id: FileId,
        offset: u64,
        buf_size: usize,
        max_line_size: usize,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file_id,
            file: None,
            offset,
            raw: Vec::new(),
            start: 0,
            chunk: vec![0; buf_size.max(1)],
            max_line_size: max_line_size.max(1),
            state: SourceState::Active,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Offset just past the last line handed out
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn buffered(&self) -> &[u8] {
        &self.raw[self.start..]
    }

    /// Open the file if needed and position it after the buffered bytes.
    fn ensure_open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let mut file = File::open(&self.path)?;
            let opened = FileId::from_file(&file)?;
            if opened != self.file_id {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "{:?} is now file {}, expected {}",
                        self.path, opened, self.file_id
                    ),
                ));
            }
            let pos = self.offset + self.buffered().len() as u64;
            file.seek(SeekFrom::Start(pos))?;
            debug!(path = ?self.path, file_id = %self.file_id, offset = pos, "Opened source");
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::other("file handle unavailable")),
        }
    }

    /// Read one chunk into the raw buffer. Returns the number of bytes read.
    fn fill(&mut self) -> io::Result<usize> {
        if self.start > 0 {
            self.raw.drain(..self.start);
            self.start = 0;
        }

        let mut chunk = std::mem::take(&mut self.chunk);
        let result = loop {
            let file = match self.ensure_open() {
                Ok(f) => f,
                Err(e) => break Err(e),
            };
            match file.read(&mut chunk) {
                Ok(n) => break Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        if let Ok(n) = result {
            self.raw.extend_from_slice(&chunk[..n]);
        }
        self.chunk = chunk;
        result
    }

    /// Next complete physical line, terminator included.
    ///
    /// Returns `Ok(None)` once everything currently in the file is consumed. A line
    /// longer than the maximum size is handed out in pieces.
    pub fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.state.is_terminal() {
            return Ok(None);
        }

        loop {
            if let Some(pos) = memchr(b'\n', self.buffered()) {
                let end = self.start + pos + 1;
                let line = self.raw[self.start..end].to_vec();
                self.start = end;
                self.offset += line.len() as u64;
                self.state = SourceState::Active;
                return Ok(Some(line));
            }

            if self.buffered().len() >= self.max_line_size {
                let window = &self.buffered()[..self.max_line_size];
                // Cut after the last ASCII byte so a multi-byte character stays whole
                let cut = match window.iter().rposition(|b| b.is_ascii()) {
                    Some(pos) => pos + 1,
                    None => self.max_line_size,
                };
                let line = window[..cut].to_vec();
                self.start += line.len();
                self.offset += line.len() as u64;
                warn!(
                    path = ?self.path,
                    max_line_size = self.max_line_size,
                    "Line exceeds maximum size, splitting"
                );
                return Ok(Some(line));
            }

            if self.fill()? == 0 {
                self.state = SourceState::Exhausted;
                return Ok(None);
            }
        }
    }

    /// Take the unterminated bytes at the end of the source, advancing past them.
    pub fn take_tail(&mut self) -> Option<Vec<u8>> {
        if self.buffered().is_empty() {
            return None;
        }
        let tail = self.raw[self.start..].to_vec();
        self.offset += tail.len() as u64;
        self.raw.clear();
        self.start = 0;
        Some(tail)
    }

    /// Whether the file shrank below what has already been read.
    pub fn is_truncated(&self) -> io::Result<bool> {
        let len = match &self.file {
            Some(file) => file.metadata()?.len(),
            None => std::fs::metadata(&self.path)?.len(),
        };
        Ok(len < self.offset + self.buffered().len() as u64)
    }

    /// Drop buffered bytes and continue from `offset`.
    pub fn reset_to(&mut self, offset: u64) -> io::Result<()> {
        self.raw.clear();
        self.start = 0;
        self.offset = offset;
        self.state = SourceState::Active;
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(())
    }

    /// Skip everything currently in the file.
    pub fn seek_to_end(&mut self) -> io::Result<()> {
        let len = match &self.file {
            Some(file) => file.metadata()?.len(),
            None => std::fs::metadata(&self.path)?.len(),
        };
        self.reset_to(len)
    }

    /// Mark the source terminal and release its handle.
    pub fn finish(&mut self, state: SourceState) {
        self.state = state;
        self.close();
    }

    /// Where the open handle lives now, which differs from `path` after a rename.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.file.as_ref().and_then(|f| get_path_from_file(f).ok())
    }

    /// Release the handle; the source can be reopened at its offset later.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = ?self.path, file_id = %self.file_id, offset = self.offset, "Closed source");
        }
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("path", &self.path)
            .field("file_id", &self.file_id)
            .field("offset", &self.offset)
            .field("buffered", &self.buffered().len())
            .field("state", &self.state)
            .finish()
    }
}
