// SPDX-License-Identifier: Apache-2.0

//! Byte-to-text decoding for sources written in a non-UTF8 encoding.
//!
//! Decoding happens one physical line at a time. The line scanner only hands over
//! bytes once a terminator has been seen, so a multi-byte sequence split across two
//! raw reads is never decoded half-way; it waits in the raw buffer for its tail.
//!
//! Unknown labels, encodings that are not ASCII-compatible (the scanner splits on the
//! `\n` byte) and the explicit no-validation names pass bytes through untouched.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

/// Names that disable decoding entirely
const PASS_THROUGH_NAMES: &[&str] = &["nopanic", "none", "binary", "raw"];

pub const DEFAULT_ENCODING: &str = "utf-8";

pub struct Decoder {
    name: String,
    encoding: Option<&'static Encoding>,
    replacements: u64,
}

impl Decoder {
    /// Build a decoder for `name`. Never fails: anything unusable degrades to pass-through.
    pub fn new(name: &str) -> Self {
        let label = name.trim();
        let encoding = if label.is_empty() {
            Some(UTF_8)
        } else if PASS_THROUGH_NAMES.contains(&label.to_lowercase().as_str()) {
            None
        } else {
            match Encoding::for_label(label.as_bytes()) {
                Some(enc) if enc.is_ascii_compatible() => Some(enc),
                Some(enc) => {
                    warn!(
                        encoding = enc.name(),
                        "Encoding is not ASCII-compatible, reading bytes without decoding"
                    );
                    None
                }
                None => {
                    warn!(
                        encoding = label,
                        "Unrecognized encoding, reading bytes without decoding"
                    );
                    None
                }
            }
        };

        Self {
            name: label.to_string(),
            encoding,
            replacements: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pass_through(&self) -> bool {
        self.encoding.is_none()
    }

    /// Number of lines in which invalid sequences were replaced
    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    /// Decode one complete line to UTF-8 bytes.
    pub fn decode<'a>(&mut self, raw: &'a [u8]) -> Cow<'a, [u8]> {
        let encoding = match self.encoding {
            Some(enc) => enc,
            None => return Cow::Borrowed(raw),
        };

        if encoding == UTF_8 && std::str::from_utf8(raw).is_ok() {
            return Cow::Borrowed(raw);
        }

        let (text, had_errors) = encoding.decode_without_bom_handling(raw);
        if had_errors {
            self.replacements += 1;
            debug!(
                encoding = encoding.name(),
                len = raw.len(),
                "Replaced invalid byte sequence while decoding"
            );
        }

        match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
            Cow::Owned(s) => Cow::Owned(s.into_bytes()),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODING)
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("name", &self.name)
            .field("encoding", &self.encoding.map(|e| e.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gb18030_four_byte_sequence() {
        let mut decoder = Decoder::new("gb18030");
        assert!(!decoder.is_pass_through());

        let out = decoder.decode(b"\x82\x31\x89\x38");
        assert_eq!(std::str::from_utf8(&out).unwrap(), "㧯");
        assert_eq!(decoder.replacements(), 0);
    }

    #[test]
    fn test_gbk_line_with_terminator() {
        let mut decoder = Decoder::new("GBK");
        let out = decoder.decode(b"\xc4\xe3\xba\xc3\n");
        assert_eq!(std::str::from_utf8(&out).unwrap(), "你好\n");
    }

    #[test]
    fn test_pass_through_names_keep_bytes() {
        for name in ["nopanic", "NONE", "binary"] {
            let mut decoder = Decoder::new(name);
            assert!(decoder.is_pass_through());

            let raw = b"\xff\xfe123123";
            assert_eq!(decoder.decode(raw).as_ref(), raw);
        }
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        let mut decoder = Decoder::new("klingon-8");
        assert!(decoder.is_pass_through());
        assert_eq!(decoder.decode(b"123123").as_ref(), b"123123");
    }

    #[test]
    fn test_non_ascii_compatible_passes_through() {
        let decoder = Decoder::new("utf-16le");
        assert!(decoder.is_pass_through());
    }

    #[test]
    fn test_utf8_valid_is_borrowed() {
        let mut decoder = Decoder::default();
        let out = decoder.decode("héllo\n".as_bytes());
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_utf8_invalid_is_replaced_not_fatal() {
        let mut decoder = Decoder::new("utf8");
        let out = decoder.decode(b"ab\xffcd\n");
        assert_eq!(std::str::from_utf8(&out).unwrap(), "ab\u{FFFD}cd\n");
        assert_eq!(decoder.replacements(), 1);
    }
}
