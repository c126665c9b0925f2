//! Tantivy-backed entry index and the indexing processor.
//!
//! Reserved document fields:
//!
//! | field        | type                    | options                  |
//! |--------------|-------------------------|--------------------------|
//! | `_id`        | raw string              | indexed, stored, fast    |
//! | `timestamp`  | i64 (ns since epoch)    | indexed, stored, fast    |
//! | `message`    | text                    | indexed, stored, fast    |
//! | `level`      | raw string              | indexed, stored, fast    |
//! | `caller`     | text                    | indexed, stored, fast    |
//! | `stacktrace` | text                    | indexed, stored, fast    |
//! | `fields`     | JSON object             | indexed                  |
//! | `_fields`    | JSON text               | stored                   |
//!
//! Dynamic fields are flattened and indexed under `fields` (query them as
//! `fields.http.status:500`). `_fields` keeps their order for display.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{JsonObjectOptions, Schema, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument};
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult, ProcessError};
use crate::id::{EntryId, IdGenerator};
use crate::pipeline::{Flow, Processor};
use crate::types::{FieldValue, LogEntry, LogField};

/// Identifier field.
pub const ID_FIELD: &str = "_id";
/// Timestamp field, nanoseconds since the epoch.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Message field.
pub const MESSAGE_FIELD: &str = "message";
/// Level field.
pub const LEVEL_FIELD: &str = "level";
/// Caller field.
pub const CALLER_FIELD: &str = "caller";
/// Stack trace field.
pub const STACKTRACE_FIELD: &str = "stacktrace";
/// Indexed dynamic fields.
pub const FIELDS_FIELD: &str = "fields";
/// Stored dynamic fields, as an ordered `[[key, value], ...]` list.
pub const STORED_FIELDS_FIELD: &str = "_fields";

/// Stored timestamp of entries without one.
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Smallest writer heap tantivy accepts.
pub const MIN_WRITER_MEMORY_BYTES: usize = 15_000_000;

/// Index location and writer sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Directory holding the index; `None` keeps it in memory.
    pub dir: Option<PathBuf>,
    /// Heap budget of the index writer.
    pub writer_memory_bytes: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            writer_memory_bytes: 50_000_000,
        }
    }
}

impl IndexConfig {
    /// Stores the index under `dir`.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Sets the writer heap budget.
    #[must_use]
    pub const fn with_writer_memory_bytes(mut self, bytes: usize) -> Self {
        self.writer_memory_bytes = bytes;
        self
    }
}

/// Converts a timestamp to its stored representation.
///
/// Instants outside the nanosecond range saturate.
#[must_use]
pub fn timestamp_to_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        NO_TIMESTAMP + 1
    } else {
        i64::MAX
    })
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(ID_FIELD, STRING | STORED | FAST);
    builder.add_i64_field(TIMESTAMP_FIELD, INDEXED | STORED | FAST);
    builder.add_text_field(MESSAGE_FIELD, TEXT | STORED | FAST);
    builder.add_text_field(LEVEL_FIELD, STRING | STORED | FAST);
    builder.add_text_field(CALLER_FIELD, TEXT | STORED | FAST);
    builder.add_text_field(STACKTRACE_FIELD, TEXT | STORED | FAST);
    builder.add_json_field(
        FIELDS_FIELD,
        JsonObjectOptions::from(TEXT).set_expand_dots_enabled(),
    );
    builder.add_text_field(STORED_FIELDS_FIELD, STORED);
    builder.build()
}

/// A searchable store of entries.
///
/// Writes are serialized; every [`LogIndex::add`] commits and refreshes the
/// reader before returning, so the entry is immediately searchable.
pub struct LogIndex {
    index: Index,
    schema: Schema,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    ids: IdGenerator,
}

impl std::fmt::Debug for LogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIndex")
            .field("entries", &self.entries_count())
            .finish_non_exhaustive()
    }
}

impl LogIndex {
    /// Creates an empty in-memory index.
    pub fn in_memory() -> IndexResult<Self> {
        Self::open(&IndexConfig::default())
    }

    /// Opens or creates the index described by `config`.
    pub fn open(config: &IndexConfig) -> IndexResult<Self> {
        let schema = build_schema();
        let index = match &config.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let directory = MmapDirectory::open(dir).map_err(tantivy::TantivyError::from)?;
                info!(dir = %dir.display(), "Opening on-disk index");
                Index::open_or_create(directory, schema.clone())?
            }
            None => Index::create_in_ram(schema.clone()),
        };
        let writer = index.writer_with_num_threads(
            1,
            config.writer_memory_bytes.max(MIN_WRITER_MEMORY_BYTES),
        )?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            schema,
            writer: Mutex::new(writer),
            reader,
            ids: IdGenerator::new(),
        })
    }

    /// Indexes `entry` under a fresh identifier and commits it.
    ///
    /// Fields holding nulls or lists are rejected before anything is written.
    pub fn add(&self, entry: &LogEntry) -> IndexResult<EntryId> {
        let (indexed, stored) = dynamic_fields(&entry.fields)?;
        let id = self.ids.generate(entry.timestamp)?;

        let mut doc = Map::new();
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        doc.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::from(entry.timestamp.as_ref().map_or(NO_TIMESTAMP, timestamp_to_nanos)),
        );
        doc.insert(MESSAGE_FIELD.to_string(), Value::from(entry.message.as_str()));
        doc.insert(LEVEL_FIELD.to_string(), Value::from(entry.level.as_str()));
        doc.insert(CALLER_FIELD.to_string(), Value::from(entry.caller.as_str()));
        doc.insert(STACKTRACE_FIELD.to_string(), Value::from(entry.stacktrace.as_str()));
        doc.insert(FIELDS_FIELD.to_string(), Value::Object(indexed));
        doc.insert(STORED_FIELDS_FIELD.to_string(), Value::String(stored));

        let json = Value::Object(doc).to_string();
        let document = TantivyDocument::parse_json(&self.schema, &json)
            .map_err(|e| IndexError::Document(e.to_string()))?;

        {
            let mut writer = self.writer.lock();
            writer.add_document(document)?;
            writer.commit()?;
        }
        self.reader.reload()?;

        debug!(id = %id, "Indexed entry");
        Ok(id)
    }

    /// Number of committed entries.
    #[must_use]
    pub fn entries_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub(crate) fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    pub(crate) const fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn query_parser(&self) -> tantivy::Result<QueryParser> {
        let fields = [MESSAGE_FIELD, STACKTRACE_FIELD, CALLER_FIELD]
            .iter()
            .map(|name| self.schema.get_field(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryParser::for_index(&self.index, fields))
    }
}

/// Maps dynamic fields to the indexed object and the stored ordered list.
fn dynamic_fields(fields: &[LogField]) -> IndexResult<(Map<String, Value>, String)> {
    let flat = LogField::flatten(fields);
    let mut indexed = Map::with_capacity(flat.len());
    let mut stored = Vec::with_capacity(flat.len());

    for (key, value) in flat {
        let json = match value {
            FieldValue::String(s) => Value::from(s.as_str()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| IndexError::UnsupportedFieldType {
                    key: key.clone(),
                    kind: "non-finite float",
                })?,
            FieldValue::Bool(b) => Value::from(b.to_string()),
            FieldValue::Null | FieldValue::List(_) | FieldValue::Group(_) => {
                return Err(IndexError::UnsupportedFieldType {
                    key,
                    kind: value.kind(),
                });
            }
        };
        stored.push(Value::Array(vec![Value::from(key.as_str()), Value::from(value.to_text())]));
        indexed.insert(key, json);
    }

    Ok((indexed, Value::Array(stored).to_string()))
}

/// Processor that indexes every entry it receives.
#[derive(Debug, Clone)]
pub struct LogIndexer {
    index: Arc<LogIndex>,
}

impl LogIndexer {
    /// Creates an indexer writing into `index`.
    #[must_use]
    pub const fn new(index: Arc<LogIndex>) -> Self {
        Self { index }
    }
}

impl Processor for LogIndexer {
    fn name(&self) -> &'static str {
        "index"
    }

    fn process(&mut self, entry: &LogEntry) -> Result<Flow, ProcessError> {
        self.index.add(entry)?;
        Ok(Flow::Continue)
    }
}
