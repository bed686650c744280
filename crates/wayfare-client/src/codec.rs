//! Response body decoding with selective timestamp coercion
//!
//! The backends serialize timestamps under keys ending in `At` (`createdAt`,
//! `updatedAt`, ...). The decoder walks the parsed JSON tree and rewrites
//! every such string field to the canonical RFC 3339 UTC rendering of the
//! instant it names. Strings that do not parse are left untouched - the
//! coercion is a convenience, not a correctness-critical transform.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

/// Key suffix that marks a field as a timestamp
const TIMESTAMP_SUFFIX: &str = "At";

/// Decode a raw response body.
///
/// Empty and whitespace-only bodies decode to `None` (the backends answer
/// some mutations with an empty 2xx). Anything else must be valid JSON.
pub fn decode_body(text: &str) -> Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(text).map_err(|e| Error::Decode {
        message: "response body is not valid JSON".to_string(),
        source: e,
    })?;

    decode_timestamps(&mut value);
    Ok(Some(value))
}

/// Rewrite every `*At` string field in place to canonical RFC 3339 UTC.
pub fn decode_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if key.ends_with(TIMESTAMP_SUFFIX) {
                    coerce_timestamp(field);
                }
                decode_timestamps(field);
            }
        }
        Value::Array(items) => {
            for item in items {
                decode_timestamps(item);
            }
        }
        _ => {}
    }
}

fn coerce_timestamp(field: &mut Value) {
    if let Value::String(raw) = field {
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            let canonical = instant
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true);
            *field = Value::String(canonical);
        }
    }
}
