// SPDX-License-Identifier: Apache-2.0

//! Field extraction for assembled records.
//!
//! - [`KeyValueParser`] - Parse logfmt-style `key=value` records

mod keyvalue;
mod traits;

pub use keyvalue::{KeyValueParser, KeyValueScanner};
pub use traits::{Fields, Parser};
