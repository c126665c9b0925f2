//! # logscope-server
//!
//! HTTP surface of logscope: one-shot search and a live-tail WebSocket,
//! built on the axum HTTP framework.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use logscope_core::{LogIndex, SearchEngine};
//! use logscope_server::{LogscopeServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(LogIndex::in_memory()?);
//!     let server = LogscopeServer::new(ServerConfig::default(), Arc::new(SearchEngine::new(index)));
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/entries/search` | GET | One page of entries; `since`, `until`, `q`, `pageSize` |
//! | `/entries/live` | GET | WebSocket live tail; client sends `{since?, q?}` |
//! | `/health` | GET | Status, indexed entry count and uptime |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod live;
pub mod routes;
pub mod server;
pub mod state;
pub mod websocket;

// Re-export main types
pub use config::{LiveTailConfig, ServerConfig};
pub use error::{LiveTailError, ServerError, ServerResult};
pub use live::{Cursor, LiveBatch, LiveQuery, LiveTail};
pub use server::LogscopeServer;
pub use state::ServerState;
