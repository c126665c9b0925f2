//! Core types for normalized log entries and searches.
//!
//! This module provides:
//! - [`FieldValue`]: Typed value of a dynamic field
//! - [`LogField`]: Ordered key/value pair, possibly holding a nested group
//! - [`Level`]: Entry severity
//! - [`LogEntry`]: A normalized log record
//! - [`SearchRequest`] / [`SearchResponse`]: Search inputs and results

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntryId;

/// Smallest page a search returns.
pub const MIN_PAGE_SIZE: usize = 15;

/// Largest page a search returns.
pub const MAX_PAGE_SIZE: usize = 200;

/// Clamps a requested page size into `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`.
#[must_use]
pub const fn clamp_page_size(requested: i64) -> usize {
    if requested < MIN_PAGE_SIZE as i64 {
        MIN_PAGE_SIZE
    } else if requested > MAX_PAGE_SIZE as i64 {
        MAX_PAGE_SIZE
    } else {
        requested as usize
    }
}

/// Value of a dynamic log field.
///
/// Serializes untagged, so `{"key":"n","value":3}` round-trips through
/// ordinary JSON clients. Groups serialize as a list of nested fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// UTF-8 text.
    String(String),
    /// Whole number that fits in 64 bits.
    Integer(i64),
    /// Any other number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Explicit JSON null.
    Null,
    /// Array of values.
    List(Vec<FieldValue>),
    /// Nested object, kept in input order.
    Group(Vec<LogField>),
}

impl FieldValue {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::List(_) => "list",
            Self::Group(_) => "group",
        }
    }

    /// Returns the text payload if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as plain text.
    ///
    /// Scalars render bare (`info`, `42`, `true`); lists and groups render
    /// as JSON.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Null => "null".to_string(),
            Self::List(_) | Self::Group(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Group(
                map.into_iter()
                    .map(|(key, value)| LogField::new(key, value))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A single dynamic field of an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogField {
    /// Field name, unique within its group.
    pub key: String,
    /// Field value.
    pub value: FieldValue,
}

impl LogField {
    /// Creates a new field.
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Flattens nested groups into leaves keyed by their dot-joined path.
    ///
    /// Leaves keep their input order. Empty groups produce no leaves.
    #[must_use]
    pub fn flatten(fields: &[Self]) -> Vec<(String, &FieldValue)> {
        let mut out = Vec::with_capacity(fields.len());
        flatten_into(fields, None, &mut out);
        out
    }
}

fn flatten_into<'a>(
    fields: &'a [LogField],
    prefix: Option<&str>,
    out: &mut Vec<(String, &'a FieldValue)>,
) {
    for field in fields {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{}", field.key),
            None => field.key.clone(),
        };
        match &field.value {
            FieldValue::Group(children) => flatten_into(children, Some(&path), out),
            value => out.push((path, value)),
        }
    }
}

/// Severity of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Debugging detail.
    Debug,
    /// Informational.
    Info,
    /// Something unexpected but handled.
    Warning,
    /// An operation failed.
    Error,
    /// The process is about to exit.
    Fatal,
    /// The process panicked.
    Panic,
    /// No level was given or it was not recognized.
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl Level {
    /// Parses a level name, case-insensitively and with common aliases.
    ///
    /// Unrecognized names yield [`Level::Unset`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "dbg" | "trace" => Self::Debug,
            "info" | "information" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" | "err" => Self::Error,
            "fatal" | "crit" | "critical" => Self::Fatal,
            "panic" => Self::Panic,
            _ => Self::Unset,
        }
    }

    /// Returns the canonical name, empty for [`Level::Unset`].
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Panic => "panic",
            Self::Unset => "",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized log record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogEntry {
    /// Assigned when the entry is indexed.
    #[serde(rename = "$id", skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    /// When the event happened; `None` if no timestamp was found.
    pub timestamp: Option<DateTime<Utc>>,
    /// Severity.
    pub level: Level,
    /// Human readable message.
    pub message: String,
    /// Remaining fields in input order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<LogField>,
    /// Source location that emitted the entry.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub caller: String,
    /// Stack trace attached to the entry.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stacktrace: String,
}

impl LogEntry {
    /// Creates an entry with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the level.
    #[must_use]
    pub const fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push(LogField::new(key, value));
        self
    }

    /// Sets the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = stacktrace.into();
        self
    }

    /// Looks up a field by dot-joined path through nested groups.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&FieldValue> {
        let mut fields = self.fields.as_slice();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let field = fields.iter().find(|f| f.key == segment)?;
            if segments.peek().is_none() {
                return Some(&field.value);
            }
            match &field.value {
                FieldValue::Group(children) => fields = children,
                _ => return None,
            }
        }
        None
    }
}

/// Parameters of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Inclusive lower bound on the timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub until: Option<DateTime<Utc>>,
    /// Query string; blank matches everything.
    pub query: String,
    /// Requested page size, clamped when executed.
    pub page_size: i64,
}

impl SearchRequest {
    /// Creates a request matching every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lower bound.
    #[must_use]
    pub const fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub const fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Sets the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets the requested page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Page size actually used when executing the request.
    #[must_use]
    pub const fn effective_page_size(&self) -> usize {
        clamp_page_size(self.page_size)
    }
}

/// Result of a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Total number of matching entries in the index, not just this page.
    pub count: u64,
    /// Matching entries, most recent first.
    pub entries: Vec<LogEntry>,
    /// Time spent executing the query.
    #[serde(skip)]
    pub duration: Duration,
}
