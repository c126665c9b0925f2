//! # logscope-core
//!
//! Ingestion, indexing and search of structured log entries.
//!
//! Raw bytes flow through optional stream filters into a parser, which
//! yields normalized [`LogEntry`] values. A [`Pipeline`] hands each entry to
//! an ordered list of processors; the [`LogIndexer`] processor makes it
//! searchable through a [`SearchEngine`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::io::BufReader;
//! use std::sync::Arc;
//!
//! use logscope_core::{
//!     EntrySearcher, LogIndex, LogIndexer, ParserRegistry, Permissive, Pipeline, Processor,
//!     SearchEngine, SearchRequest,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let index = Arc::new(LogIndex::in_memory()?);
//! let source = ParserRegistry::with_builtins()
//!     .open("json", Box::new(BufReader::new(std::io::stdin())))?;
//! let mut processors: Vec<Box<dyn Processor>> = vec![Box::new(LogIndexer::new(index.clone()))];
//!
//! Pipeline::new(source, Permissive::reporting()).run(&mut processors, &CancellationToken::new())?;
//!
//! let page = SearchEngine::new(index).search(&SearchRequest::new().with_query("timeout"))?;
//! println!("{} matches", page.count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Normalization
//!
//! | Input key | Entry attribute |
//! |-----------|-----------------|
//! | `timestamp`, `@timestamp`, `ts`, `time`, `date`, `datetime` | `timestamp` |
//! | `msg` | `message` |
//! | `level` | `level` |
//! | `caller` | `caller` |
//! | `stacktrace` | `stacktrace` |
//! | anything else | `fields`, in input order |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod filters;
pub mod id;
pub mod index;
pub mod normalizer;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod search;
pub mod source;
pub mod timestamp;
pub mod types;

// Re-export main types
pub use error::{
    ConfigError, IndexError, IndexResult, PipelineError, ProcessError, SearchError, SearchResult,
    SourceError,
};
pub use id::{EntryId, IdGenerator, ParseEntryIdError};
pub use index::{IndexConfig, LogIndex, LogIndexer};
pub use normalizer::normalize;
pub use pipeline::{ErrorPolicy, Flow, Permissive, Pipeline, PipelineStats, Processor, Strict};
pub use processors::{EchoProcessor, FieldFilter, Predicate};
pub use registry::{ByteStream, FilterRegistry, ParserRegistry, Registry};
pub use search::{EntrySearcher, SearchEngine};
pub use source::{EntrySource, JsonSource, MAX_LINE_BYTES};
pub use timestamp::{parse_timestamp, TimestampLayout};
pub use types::{
    clamp_page_size, FieldValue, Level, LogEntry, LogField, SearchRequest, SearchResponse,
    MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
