//! Time-ranged, paginated search over a [`LogIndex`].
//!
//! This module provides:
//! - [`EntrySearcher`]: the search seam used by the HTTP and live-tail layers
//! - [`SearchEngine`]: the tantivy-backed implementation
//!
//! Results are ordered by timestamp, most recent first. `count` is the
//! total number of matches, independent of the page size.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery};
use tantivy::{Document, Order, TantivyDocument};
use tracing::debug;

use crate::error::{SearchError, SearchResult};
use crate::id::EntryId;
use crate::index::{
    timestamp_to_nanos, LogIndex, CALLER_FIELD, ID_FIELD, LEVEL_FIELD, MESSAGE_FIELD,
    NO_TIMESTAMP, STACKTRACE_FIELD, STORED_FIELDS_FIELD, TIMESTAMP_FIELD,
};
use crate::types::{Level, LogEntry, LogField, SearchRequest, SearchResponse};

/// Executes search requests.
pub trait EntrySearcher: Send + Sync {
    /// Runs `request` against the current state of the index.
    fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse>;

    /// Number of searchable entries.
    fn entries_count(&self) -> u64;
}

impl<T: EntrySearcher + ?Sized> EntrySearcher for Arc<T> {
    fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        (**self).search(request)
    }

    fn entries_count(&self) -> u64 {
        (**self).entries_count()
    }
}

/// Searches a [`LogIndex`].
///
/// Bare query terms match `message`, `stacktrace` and `caller`. Other
/// attributes and dynamic fields are addressed explicitly, e.g.
/// `level:error` or `fields.http.status:500`. Both ends of the time range
/// are inclusive.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    index: Arc<LogIndex>,
}

impl SearchEngine {
    /// Creates an engine over `index`.
    #[must_use]
    pub const fn new(index: Arc<LogIndex>) -> Self {
        Self { index }
    }

    fn build_query(&self, request: &SearchRequest) -> SearchResult<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if request.since.is_some() || request.until.is_some() {
            let lower = request
                .since
                .as_ref()
                .map_or(Bound::Unbounded, |t| Bound::Included(timestamp_to_nanos(t)));
            let upper = request
                .until
                .as_ref()
                .map_or(Bound::Unbounded, |t| Bound::Included(timestamp_to_nanos(t)));
            clauses.push((
                Occur::Must,
                Box::new(RangeQuery::new_i64_bounds(
                    TIMESTAMP_FIELD.to_string(),
                    lower,
                    upper,
                )),
            ));
        }

        let text = request.query.trim();
        if !text.is_empty() {
            let parser = self.index.query_parser()?;
            clauses.push((Occur::Must, parser.parse_query(text)?));
        }

        if clauses.is_empty() {
            Ok(Box::new(AllQuery))
        } else {
            Ok(Box::new(BooleanQuery::new(clauses)))
        }
    }
}

impl EntrySearcher for SearchEngine {
    fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let started = Instant::now();
        let query = self.build_query(request)?;
        let limit = request.effective_page_size();

        let searcher = self.index.searcher();
        let collector = (
            TopDocs::with_limit(limit).order_by_fast_field::<i64>(TIMESTAMP_FIELD, Order::Desc),
            Count,
        );
        let (top, count) = searcher.search(query.as_ref(), &collector)?;

        let schema = self.index.schema();
        let entries = top
            .into_iter()
            .map(|(_, address)| {
                let doc: TantivyDocument = searcher.doc(address)?;
                decode(&doc.to_json(schema))
            })
            .collect::<SearchResult<Vec<_>>>()?;

        let duration = started.elapsed();
        debug!(
            query = %request.query,
            count,
            returned = entries.len(),
            elapsed_us = duration.as_micros(),
            "Search completed"
        );
        Ok(SearchResponse {
            count: count as u64,
            entries,
            duration,
        })
    }

    fn entries_count(&self) -> u64 {
        self.index.entries_count()
    }
}

/// Rebuilds an entry from a stored document rendered as JSON.
///
/// Every stored field renders as an array of values.
fn decode(json: &str) -> SearchResult<LogEntry> {
    let doc: Map<String, Value> =
        serde_json::from_str(json).map_err(|e| SearchError::Corrupt(e.to_string()))?;
    let first = |name: &str| doc.get(name).and_then(|values| values.get(0));
    let text = |name: &str| {
        first(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let id = text(ID_FIELD)
        .parse::<EntryId>()
        .map_err(|e| SearchError::Corrupt(e.to_string()))?;
    let nanos = first(TIMESTAMP_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| SearchError::Corrupt(format!("entry {id} has no timestamp")))?;

    let stored = text(STORED_FIELDS_FIELD);
    let pairs: Vec<(String, String)> = if stored.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&stored).map_err(|e| SearchError::Corrupt(e.to_string()))?
    };

    Ok(LogEntry {
        id: Some(id),
        timestamp: (nanos != NO_TIMESTAMP).then(|| Utc.timestamp_nanos(nanos)),
        level: Level::parse(&text(LEVEL_FIELD)),
        message: text(MESSAGE_FIELD),
        fields: pairs
            .into_iter()
            .map(|(key, value)| LogField::new(key, value))
            .collect(),
        caller: text(CALLER_FIELD),
        stacktrace: text(STACKTRACE_FIELD),
    })
}
