//! CLI error types.

use logscope_core::ConfigError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration file or flag.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown filter, parser or malformed predicate.
    #[error(transparent)]
    Setup(#[from] ConfigError),

    /// The log source could not be opened.
    #[error("cannot open {path}: {source}")]
    Source {
        /// Path given on the command line.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
