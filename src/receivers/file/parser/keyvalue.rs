// SPDX-License-Identifier: Apache-2.0

//! logfmt-style `key=value` parsing.
//!
//! Pairs are separated by whitespace, but a value may itself contain spaces: it runs
//! until the whitespace that precedes the next `key=`. Surrounding double quotes are
//! stripped from keys and values.

use serde_json::{Number, Value};

use super::traits::{Fields, Parser};
use crate::receivers::file::error::{Error, Result};

pub const DEFAULT_SPLITTER: &str = "=";

/// Yields raw (key, value) pairs, both trimmed but still quoted.
#[derive(Debug, Clone)]
pub struct KeyValueScanner<'a> {
    rest: &'a str,
    sep: &'a str,
}

impl<'a> KeyValueScanner<'a> {
    pub fn new(line: &'a str, sep: &'a str) -> Self {
        Self { rest: line, sep }
    }

    /// Position of the whitespace that ends the value starting at `value_start`,
    /// i.e. the one right before the next non-empty key.
    fn value_end(&self, value_start: usize) -> Option<usize> {
        let rest = self.rest;
        let mut search_from = value_start;
        while let Some(found) = rest[search_from..].find(self.sep) {
            let next_sep = search_from + found;
            let before = rest[value_start..next_sep].trim_end();
            if let Some(ws) = before.rfind(char::is_whitespace) {
                if !before[ws..].trim().is_empty() {
                    return Some(value_start + ws);
                }
            }
            search_from = next_sep + self.sep.len();
        }
        None
    }
}

impl<'a> Iterator for KeyValueScanner<'a> {
    type Item = Result<(&'a str, &'a str)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.sep.is_empty() {
            self.rest = "";
            return Some(Err(Error::Parse("key/value splitter is empty".to_string())));
        }

        let rest = self.rest.trim_start();
        self.rest = rest;
        if rest.is_empty() {
            return None;
        }

        let Some(sep_pos) = rest.find(self.sep) else {
            self.rest = "";
            return Some(Err(Error::Parse(format!(
                "no `{}` found in `{}`",
                self.sep, rest
            ))));
        };

        let key = rest[..sep_pos].trim();
        let value_start = sep_pos + self.sep.len();

        let value = match self.value_end(value_start) {
            Some(end) => {
                let value = rest[value_start..end].trim();
                self.rest = &rest[end..];
                value
            }
            None => {
                self.rest = "";
                rest[value_start..].trim()
            }
        };

        Some(Ok((key, value)))
    }
}

/// Strip the quotes that wrap a whole key, a whole value, or a quoted `"key=value"`.
fn unquote<'a>(key: &'a str, value: &'a str) -> (&'a str, &'a str) {
    let key_quotes = key.matches('"').count();
    let value_quotes = value.matches('"').count();
    let (mut key, mut value) = (key, value);

    if key_quotes % 2 == 1 && value_quotes % 2 == 1 {
        if let (Some(k), Some(v)) = (key.strip_prefix('"'), value.strip_suffix('"')) {
            key = k;
            value = v;
        }
    }
    if key_quotes % 2 == 0 && key.len() > 1 {
        if let Some(k) = key.strip_prefix('"').and_then(|k| k.strip_suffix('"')) {
            key = k;
        }
    }
    if value_quotes % 2 == 0 && value.len() > 1 {
        if let Some(v) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            value = v;
        }
    }
    (key, value)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Convert an unquoted scalar; quoted values always stay strings.
fn typed_value(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Number::from_f64(f).map(Value::Number);
    }
    parse_bool(raw).map(Value::Bool)
}

#[derive(Debug, Clone)]
pub struct KeyValueParser {
    splitter: String,
    keep_string: bool,
}

impl Default for KeyValueParser {
    fn default() -> Self {
        Self {
            splitter: DEFAULT_SPLITTER.to_string(),
            keep_string: false,
        }
    }
}

impl KeyValueParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_splitter(mut self, splitter: impl Into<String>) -> Self {
        self.splitter = splitter.into();
        self
    }

    /// Keep every value as a string instead of converting numbers and booleans.
    pub fn with_keep_string(mut self, keep_string: bool) -> Self {
        self.keep_string = keep_string;
        self
    }
}

impl Parser for KeyValueParser {
    fn parse(&self, line: &str) -> Result<Fields> {
        let mut fields = Fields::new();

        for pair in KeyValueScanner::new(line, &self.splitter) {
            let (raw_key, raw_value) = pair?;
            let (key, value) = unquote(raw_key, raw_value);
            if key.is_empty() {
                return Err(Error::Parse(format!("empty key in `{}`", line)));
            }

            let typed = if self.keep_string {
                None
            } else {
                typed_value(raw_value)
            };
            let value = typed.unwrap_or_else(|| Value::String(value.to_string()));
            fields.insert(key.to_string(), value);
        }

        if fields.is_empty() {
            return Err(Error::Parse("no key/value pairs found".to_string()));
        }
        Ok(fields)
    }
}
