//! Error types for the ingestion pipeline, the index and search.
//!
//! The taxonomy mirrors how each failure is handled:
//! - [`SourceError`]: per-line parse failures (recoverable) and stream failures (fatal)
//! - [`ProcessError`]: a processor rejected an entry (recoverable by policy)
//! - [`PipelineError`]: what a pipeline run terminates with
//! - [`ConfigError`]: unknown filter/parser names and bad predicates, fatal at startup
//! - [`IndexError`] / [`SearchError`]: index engine failures

use thiserror::Error;

/// Errors produced by an entry source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A line could not be parsed into an entry.
    #[error("invalid JSON at line {line}: {reason}")]
    Parse {
        /// 1-based line number.
        line: u64,
        /// The offending raw text, truncated.
        fragment: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A line exceeded the maximum accepted length.
    #[error("line {line} exceeds the maximum length of {limit} bytes")]
    LineTooLong {
        /// 1-based line number.
        line: u64,
        /// Configured maximum in bytes.
        limit: usize,
    },

    /// Reading the underlying stream failed.
    #[error("I/O error at line {line}: {source}")]
    Io {
        /// 1-based line number being read.
        line: u64,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Returns true if the source cannot produce further entries.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }

    /// Returns the line number this error refers to.
    #[must_use]
    pub const fn line(&self) -> u64 {
        match self {
            Self::Parse { line, .. } | Self::LineTooLong { line, .. } | Self::Io { line, .. } => {
                *line
            }
        }
    }
}

/// Startup configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No filter is registered under this name.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// No parser is registered under this name.
    #[error("unknown parser: {0}")]
    UnknownParser(String),

    /// A field predicate could not be parsed.
    #[error("invalid field predicate: {0}")]
    InvalidPredicate(String),
}

/// Errors raised while indexing an entry.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index engine failed.
    #[error("index engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),

    /// The entry could not be converted into a document.
    #[error("failed to build document: {0}")]
    Document(String),

    /// A field carries a value the schema cannot hold.
    #[error("unsupported field type {kind} for field {key}")]
    UnsupportedFieldType {
        /// Flattened key of the offending field.
        key: String,
        /// Kind of value found.
        kind: &'static str,
    },

    /// More than 2^80 identifiers were requested within one millisecond.
    #[error("entry id space exhausted for millisecond {0}")]
    IdOverflow(u64),

    /// The entry timestamp cannot be encoded into an identifier.
    #[error("timestamp out of range for entry id: {0}ms")]
    TimestampOutOfRange(i64),

    /// Creating the index directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query string could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] tantivy::query::QueryParserError),

    /// The index engine failed.
    #[error("index engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),

    /// A stored document could not be turned back into an entry.
    #[error("corrupt stored document: {0}")]
    Corrupt(String),
}

/// Errors returned by a processor for a single entry.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Indexing the entry failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Writing the entry failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the entry failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a pipeline run stops before the end of its source.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The entry source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A processor failed and the error policy did not recover.
    #[error("processor {processor} failed: {source}")]
    Processor {
        /// Name of the processor.
        processor: &'static str,
        /// The processor's error.
        #[source]
        source: ProcessError,
    },

    /// The run was cancelled.
    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Returns true if this is the cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Result type alias for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = SourceError::Parse {
            line: 3,
            fragment: "not json".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "invalid JSON at line 3: expected value");
        assert!(!err.is_fatal());
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn line_too_long_is_fatal() {
        let err = SourceError::LineTooLong {
            line: 7,
            limit: 32 * 1024,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("32768"));
    }

    #[test]
    fn io_error_is_fatal() {
        let err = SourceError::Io {
            line: 1,
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn config_error_display() {
        assert_eq!(
            ConfigError::UnknownFilter("gzip".to_string()).to_string(),
            "unknown filter: gzip"
        );
        assert_eq!(
            ConfigError::UnknownParser("xml".to_string()).to_string(),
            "unknown parser: xml"
        );
    }

    #[test]
    fn unsupported_field_type_display() {
        let err = IndexError::UnsupportedFieldType {
            key: "tags".to_string(),
            kind: "list",
        };
        assert_eq!(err.to_string(), "unsupported field type list for field tags");
    }

    #[test]
    fn processor_error_wraps_source() {
        let err = PipelineError::Processor {
            processor: "index",
            source: ProcessError::Index(IndexError::IdOverflow(42)),
        };
        assert!(err.to_string().starts_with("processor index failed"));
        assert!(!err.is_cancelled());
        assert!(PipelineError::Cancelled.is_cancelled());
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SourceError>();
        assert_send_sync::<PipelineError>();
        assert_send_sync::<SearchError>();
        assert_send_sync::<IndexError>();
    }
}
