//! # logscope-cli
//!
//! The `logscope` binary: reads a structured log stream from a file or
//! standard input, indexes every entry and serves search and live tail
//! over HTTP while it runs.
//!
//! ```text
//! source ─► filters ─► parser ─► field filter ─► index ─► echo
//!                                                  │
//!                                   HTTP search + live tail
//! ```
//!
//! Settings come from an optional TOML file (`--config`) and are
//! overridden by command-line flags.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::run;
pub use cli::Cli;
pub use config::LogscopeConfig;
pub use error::CliError;
