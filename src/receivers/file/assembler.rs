// SPDX-License-Identifier: Apache-2.0

//! Multi-line record assembly.
//!
//! Physical lines are fed in order; a [`LineClassifier`] decides whether each line
//! stands alone, opens a new record, or continues the pending one. Completed records
//! queue up until taken. Nothing is flushed on exhaustion: the caller decides when a
//! pending record is final.

use std::collections::VecDeque;

use regex::bytes::Regex;
use tracing::warn;

use crate::receivers::file::error::{Error, Result};

/// How a physical line relates to record boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// The line is a whole record
    Complete,
    /// The line starts a new record
    Head,
    /// The line belongs to the pending record
    Continuation,
}

/// Decides record boundaries one physical line at a time.
pub trait LineClassifier: Send + std::fmt::Debug {
    /// Classify `line`, given without its terminator.
    fn classify(&self, line: &[u8]) -> LineKind;

    /// Whether this classifier groups lines at all
    fn is_multiline(&self) -> bool {
        true
    }
}

/// Every physical line terminates a record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBoundary;

impl LineClassifier for NoBoundary {
    fn classify(&self, _line: &[u8]) -> LineKind {
        LineKind::Complete
    }

    fn is_multiline(&self) -> bool {
        false
    }
}

/// Lines matching the head pattern open a record; anything else is appended.
#[derive(Debug, Clone)]
pub struct PatternBoundary {
    regex: Regex,
}

impl PatternBoundary {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Regex(format!("invalid head_pattern `{}`: {}", pattern, e)))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl LineClassifier for PatternBoundary {
    fn classify(&self, line: &[u8]) -> LineKind {
        if self.regex.is_match(line) {
            LineKind::Head
        } else {
            LineKind::Continuation
        }
    }
}

/// Build the classifier for an optional head pattern; empty means one line per record.
pub fn classifier_for(head_pattern: Option<&str>) -> Result<Box<dyn LineClassifier>> {
    match head_pattern {
        Some(p) if !p.is_empty() => Ok(Box::new(PatternBoundary::new(p)?)),
        _ => Ok(Box::new(NoBoundary)),
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Debug)]
pub struct RecordAssembler {
    classifier: Box<dyn LineClassifier>,
    pending: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    max_record_size: usize,
}

impl RecordAssembler {
    pub fn new(classifier: Box<dyn LineClassifier>, max_record_size: usize) -> Self {
        Self {
            classifier,
            pending: Vec::new(),
            ready: VecDeque::new(),
            max_record_size,
        }
    }

    pub fn set_classifier(&mut self, classifier: Box<dyn LineClassifier>) {
        self.classifier = classifier;
    }

    pub fn is_multiline(&self) -> bool {
        self.classifier.is_multiline()
    }

    /// Seed the pending record, e.g. from a checkpoint.
    pub fn restore_pending(&mut self, pending: Vec<u8>) {
        self.pending = pending;
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Feed one physical line, terminator included.
    pub fn push_line(&mut self, line: &[u8]) {
        match self.classifier.classify(trim_terminator(line)) {
            LineKind::Complete => {
                self.flush();
                self.ready.push_back(line.to_vec());
            }
            LineKind::Head => {
                self.flush();
                self.pending.extend_from_slice(line);
            }
            LineKind::Continuation => {
                if !self.pending.is_empty()
                    && self.pending.len() + line.len() > self.max_record_size
                {
                    warn!(
                        pending = self.pending.len(),
                        max_record_size = self.max_record_size,
                        "Record exceeds maximum size, flushing early"
                    );
                    self.flush();
                }
                self.pending.extend_from_slice(line);
            }
        }
    }

    /// Finalize the pending record, if any.
    pub fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.ready.push_back(std::mem::take(&mut self.pending));
        true
    }

    /// Take the oldest completed record.
    pub fn pop_record(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }
}
