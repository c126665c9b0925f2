//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration of the live-tail broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTailConfig {
    /// Delay between two searches of one connection.
    pub poll_interval: Duration,
    /// Batches buffered between the fetcher and the socket writer.
    pub channel_capacity: usize,
    /// Page size of each search, clamped like any other search.
    pub page_size: i64,
}

impl Default for LiveTailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            channel_capacity: 10,
            page_size: 15,
        }
    }
}

impl LiveTailConfig {
    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the channel capacity.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// Maximum concurrent live-tail connections.
    pub max_live_connections: usize,
    /// Live-tail settings.
    pub live_tail: LiveTailConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cors_origins: Vec::new(),
            max_live_connections: 256,
            live_tail: LiveTailConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Set the maximum live-tail connections.
    #[must_use]
    pub const fn with_max_live_connections(mut self, max: usize) -> Self {
        self.max_live_connections = max;
        self
    }

    /// Set the live-tail settings.
    #[must_use]
    pub const fn with_live_tail(mut self, live_tail: LiveTailConfig) -> Self {
        self.live_tail = live_tail;
        self
    }
}
