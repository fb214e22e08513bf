// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Deserializer};

pub(crate) fn parse_bool_value(val: &str) -> Result<bool, String> {
    match val.trim().to_lowercase().as_str() {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(format!("Unable to parse bool value: {}", val)),
    }
}

// Support deser into a string from multiple value types. This allows a config file
// to give a run_time of 10 rather than "10"
pub(crate) fn deser_into_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(num) => Ok(Some(num.to_string())),
        serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
        serde_json::Value::String(s) => Ok(Some(s)),
        _ => Err(serde::de::Error::custom(
            "unexpected value for string parameter",
        )),
    }
}
