// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

use crate::receivers::file::error::Result;
use crate::receivers::file::reader::Record;

/// Structured fields extracted from one record
pub type Fields = Map<String, Value>;

/// Parser turns the text of a record into structured fields.
///
/// Malformed input is reported as [`Error::Parse`](crate::receivers::file::Error::Parse);
/// the caller decides whether to keep the raw record.
pub trait Parser: Send + Sync {
    /// Parse one record's text
    fn parse(&self, line: &str) -> Result<Fields>;

    /// Parse a record, trailing line terminator ignored
    fn parse_record(&self, record: &Record) -> Result<Fields> {
        let text = record.text();
        self.parse(text.trim_end_matches(['\r', '\n']))
    }
}
