// SPDX-License-Identifier: Apache-2.0

pub mod args;
pub(crate) mod parse;
