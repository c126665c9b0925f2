//! Shared state for the logscope server.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use logscope_core::EntrySearcher;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared state for the HTTP server.
pub struct ServerState {
    /// Server configuration.
    config: Arc<ServerConfig>,
    /// Search backend.
    searcher: Arc<dyn EntrySearcher>,
    /// Number of active live-tail connections.
    live_connections: AtomicUsize,
    /// Server start time.
    start_time: Instant,
    /// Cancelled when the server shuts down; parent of every live-tail scope.
    shutdown: CancellationToken,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("live_connections", &self.live_connection_count())
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Create a new server state.
    pub fn new(config: ServerConfig, searcher: Arc<dyn EntrySearcher>) -> Self {
        Self {
            config: Arc::new(config),
            searcher,
            live_connections: AtomicUsize::new(0),
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the search backend.
    #[must_use]
    pub fn searcher(&self) -> Arc<dyn EntrySearcher> {
        Arc::clone(&self.searcher)
    }

    /// Token cancelled on server shutdown.
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Get the number of active live-tail connections.
    #[must_use]
    pub fn live_connection_count(&self) -> usize {
        self.live_connections.load(Ordering::Relaxed)
    }

    /// Increment the live-tail connection count.
    ///
    /// Returns `true` if the connection was allowed, `false` if limit reached.
    pub fn add_live_connection(&self) -> bool {
        let current = self.live_connections.fetch_add(1, Ordering::Relaxed);
        if current >= self.config.max_live_connections {
            self.live_connections.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Decrement the live-tail connection count.
    pub fn remove_live_connection(&self) {
        self.live_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
