//! Turns a decoded JSON object into a [`LogEntry`].
//!
//! The normalizer never fails: missing or malformed well-known keys leave the
//! corresponding attribute empty and the raw value stays among the fields.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::timestamp::{from_unix_seconds, parse_timestamp};
use crate::types::{FieldValue, Level, LogEntry, LogField};

/// Keys probed for the timestamp, in priority order.
pub const TIMESTAMP_KEYS: [&str; 6] = ["timestamp", "@timestamp", "ts", "time", "date", "datetime"];

/// Key holding the message.
pub const MESSAGE_KEY: &str = "msg";
/// Key holding the level.
pub const LEVEL_KEY: &str = "level";
/// Key holding the caller.
pub const CALLER_KEY: &str = "caller";
/// Key holding the stack trace.
pub const STACKTRACE_KEY: &str = "stacktrace";

/// Normalizes a decoded record.
///
/// The map must preserve insertion order (serde_json is built with
/// `preserve_order`), since the remaining keys become the entry's fields in
/// that order.
#[must_use]
pub fn normalize(mut record: Map<String, Value>) -> LogEntry {
    let timestamp = take_timestamp(&mut record);
    let message = take_string(&mut record, MESSAGE_KEY);
    let level = take_string(&mut record, LEVEL_KEY);
    let caller = take_string(&mut record, CALLER_KEY);
    let stacktrace = take_string(&mut record, STACKTRACE_KEY);

    LogEntry {
        id: None,
        timestamp,
        level: level.as_deref().map_or(Level::Unset, Level::parse),
        message: message.unwrap_or_default(),
        fields: record
            .into_iter()
            .map(|(key, value)| LogField::new(key, FieldValue::from(value)))
            .collect(),
        caller: caller.unwrap_or_default(),
        stacktrace: stacktrace.unwrap_or_default(),
    }
}

/// Consumes the first timestamp key present.
///
/// Its value is removed even when it cannot be interpreted.
fn take_timestamp(record: &mut Map<String, Value>) -> Option<DateTime<Utc>> {
    let key = TIMESTAMP_KEYS.iter().find(|k| record.contains_key(**k))?;
    match record.shift_remove(*key)? {
        Value::Number(n) => match n.as_i64() {
            Some(secs) => Utc.timestamp_opt(secs, 0).single(),
            None => n.as_f64().and_then(from_unix_seconds),
        },
        Value::String(s) => parse_timestamp(&s),
        _ => None,
    }
}

/// Removes `key` only if it holds a string.
fn take_string(record: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !matches!(record.get(key), Some(Value::String(_))) {
        return None;
    }
    match record.shift_remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}
