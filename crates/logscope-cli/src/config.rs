//! Configuration file loading and command-line overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logscope_core::index::MIN_WRITER_MEMORY_BYTES;
use logscope_core::IndexConfig;
use logscope_server::{LiveTailConfig, ServerConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::CliError;

/// Complete logscope configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogscopeConfig {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Ingestion settings.
    pub pipeline: PipelineSection,
    /// Live-tail session settings.
    pub live_tail: LiveTailSection,
    /// Index storage settings.
    pub index: IndexSection,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins; empty allows any.
    pub cors_origins: Vec<String>,
    /// Maximum concurrent live-tail sessions.
    pub max_live_connections: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            bind_addr: server.bind_addr,
            cors_origins: server.cors_origins,
            max_live_connections: server.max_live_connections,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Parser name.
    pub parser: String,
    /// Filter names, first innermost.
    pub filters: Vec<String>,
    /// Log dropped parse errors.
    pub show_parse_errors: bool,
    /// Stop on the first error.
    pub strict: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            parser: "json".to_string(),
            filters: Vec::new(),
            show_parse_errors: false,
            strict: false,
        }
    }
}

/// `[live_tail]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveTailSection {
    /// Milliseconds between polls.
    pub poll_interval_ms: u64,
    /// Batches buffered between fetcher and writer.
    pub channel_capacity: usize,
    /// Entries fetched per poll.
    pub page_size: i64,
}

impl Default for LiveTailSection {
    fn default() -> Self {
        let live = LiveTailConfig::default();
        Self {
            poll_interval_ms: u64::try_from(live.poll_interval.as_millis()).unwrap_or(u64::MAX),
            channel_capacity: live.channel_capacity,
            page_size: live.page_size,
        }
    }
}

/// `[index]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Directory for an on-disk index; memory when unset.
    pub dir: Option<PathBuf>,
    /// Indexing buffer size in bytes.
    pub writer_memory_bytes: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        let index = IndexConfig::default();
        Self {
            dir: index.dir,
            writer_memory_bytes: index.writer_memory_bytes,
        }
    }
}

impl LogscopeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `--config`, or defaults, then applies flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or the result is invalid.
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Overrides settings with the flags given on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = cli.bind {
            self.server.bind_addr = addr;
        }
        if let Some(parser) = &cli.parser {
            self.pipeline.parser.clone_from(parser);
        }
        if !cli.filter.is_empty() {
            self.pipeline.filters.clone_from(&cli.filter);
        }
        if let Some(dir) = &cli.index_dir {
            self.index.dir = Some(dir.clone());
        }
        self.pipeline.show_parse_errors |= cli.show_parse_errors;
        self.pipeline.strict |= cli.strict;
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.pipeline.parser.trim().is_empty() {
            return Err(CliError::Config("pipeline.parser cannot be empty".into()));
        }
        if self.server.max_live_connections == 0 {
            return Err(CliError::Config(
                "server.max_live_connections must be greater than zero".into(),
            ));
        }
        if self.live_tail.poll_interval_ms == 0 {
            return Err(CliError::Config(
                "live_tail.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.live_tail.channel_capacity == 0 {
            return Err(CliError::Config(
                "live_tail.channel_capacity must be greater than zero".into(),
            ));
        }
        if self.index.writer_memory_bytes < MIN_WRITER_MEMORY_BYTES {
            return Err(CliError::Config(format!(
                "index.writer_memory_bytes must be at least {MIN_WRITER_MEMORY_BYTES}"
            )));
        }
        Ok(())
    }

    /// Server settings for [`logscope_server::LogscopeServer`].
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let live_tail = LiveTailConfig::default()
            .with_poll_interval(Duration::from_millis(self.live_tail.poll_interval_ms))
            .with_channel_capacity(self.live_tail.channel_capacity)
            .with_page_size(self.live_tail.page_size);

        let mut config = ServerConfig::new(self.server.bind_addr)
            .with_max_live_connections(self.server.max_live_connections)
            .with_live_tail(live_tail);
        for origin in &self.server.cors_origins {
            config = config.with_cors_origin(origin.clone());
        }
        config
    }

    /// Index settings for [`logscope_core::LogIndex::open`].
    #[must_use]
    pub fn index_config(&self) -> IndexConfig {
        let config = IndexConfig::default().with_writer_memory_bytes(self.index.writer_memory_bytes);
        match &self.index.dir {
            Some(dir) => config.with_dir(dir.clone()),
            None => config,
        }
    }
}
