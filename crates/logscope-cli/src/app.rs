//! Wires the source, pipeline, index and server together.

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

use anyhow::Context;
use logscope_core::{
    ByteStream, EchoProcessor, EntrySource, FieldFilter, FilterRegistry, LogIndex, LogIndexer,
    ParserRegistry, Permissive, Pipeline, PipelineError, PipelineStats, Processor, SearchEngine,
    Strict,
};
use logscope_server::{LogscopeServer, ServerResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, STDIN_SOURCE};
use crate::config::{LogscopeConfig, PipelineSection};
use crate::error::CliError;

/// Runs logscope until the input ends or the process is interrupted.
///
/// With the server enabled, reaching the end of the input keeps the server
/// up until Ctrl-C.
///
/// # Errors
///
/// Returns an error on invalid configuration, an unopenable source, a
/// pipeline failure the error policy does not recover from, or a server
/// start-up failure.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = LogscopeConfig::load(&cli)?;

    let index = Arc::new(LogIndex::open(&config.index_config()).context("failed to open index")?);
    let source = build_source(open_input(&cli.source)?, &config.pipeline)?;
    let mut processors = build_processors(&cli.predicates, Arc::clone(&index), cli.echo)?;

    let cancel = CancellationToken::new();
    let mut server = (!cli.no_web).then(|| spawn_server(&config, Arc::clone(&index), &cancel));

    let settings = config.pipeline.clone();
    let pipeline_cancel = cancel.clone();
    let mut pipeline = tokio::task::spawn_blocking(move || {
        ingest(source, &mut processors, &settings, &pipeline_cancel)
    });

    let interrupted = tokio::select! {
        result = &mut pipeline => {
            match result.context("pipeline task failed")? {
                Ok(stats) => {
                    info!(
                        entries = stats.entries,
                        indexed = stats.processed,
                        skipped = stats.skipped,
                        dropped = stats.recovered,
                        "End of stream"
                    );
                    false
                }
                Err(e) => {
                    cancel.cancel();
                    return Err(e).context("pipeline failed");
                }
            }
        }
        result = server_exit(server.as_mut()) => {
            cancel.cancel();
            return result;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for interrupt")?;
            info!("Interrupted");
            true
        }
    };

    if let Some(handle) = server.as_mut().filter(|_| !interrupted) {
        info!(entries = index.entries_count(), "Serving until interrupted");
        tokio::select! {
            result = &mut *handle => {
                cancel.cancel();
                return result.context("server task failed")?.map_err(Into::into);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for interrupt")?;
                info!("Interrupted");
            }
        }
    }

    cancel.cancel();
    if let Some(handle) = server {
        handle.await.context("server task failed")??;
    }
    Ok(())
}

fn spawn_server(
    config: &LogscopeConfig,
    index: Arc<LogIndex>,
    cancel: &CancellationToken,
) -> JoinHandle<ServerResult<()>> {
    let server = LogscopeServer::new(config.server_config(), Arc::new(SearchEngine::new(index)));
    let shutdown = cancel.clone().cancelled_owned();
    tokio::spawn(async move { server.serve_with_shutdown(shutdown).await })
}

/// Completes when the server task ends; never completes without a server.
async fn server_exit(handle: Option<&mut JoinHandle<ServerResult<()>>>) -> anyhow::Result<()> {
    match handle {
        Some(handle) => {
            handle.await.context("server task failed")??;
            warn!("Server stopped");
            Ok(())
        }
        None => std::future::pending().await,
    }
}

/// Opens standard input or the file at `path`.
///
/// # Errors
///
/// Returns [`CliError::Source`] if the file cannot be opened.
pub fn open_input(path: &str) -> Result<ByteStream, CliError> {
    if path == STDIN_SOURCE {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).map_err(|source| CliError::Source {
        path: path.to_string(),
        source,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Applies the configured filters and parser to `input`.
///
/// # Errors
///
/// Returns an error if a filter or the parser is not registered.
pub fn build_source(
    input: ByteStream,
    settings: &PipelineSection,
) -> Result<Box<dyn EntrySource>, CliError> {
    let filtered = FilterRegistry::with_builtins().chain(&settings.filters, input)?;
    Ok(ParserRegistry::with_builtins().open(&settings.parser, filtered)?)
}

/// Builds the processor chain: field filter, indexer, then echo.
///
/// # Errors
///
/// Returns an error if a predicate is malformed.
pub fn build_processors(
    predicates: &[String],
    index: Arc<LogIndex>,
    echo: bool,
) -> Result<Vec<Box<dyn Processor>>, CliError> {
    let mut processors: Vec<Box<dyn Processor>> = Vec::new();

    let filter = FieldFilter::parse(predicates)?;
    if !filter.is_empty() {
        processors.push(Box::new(filter));
    }
    processors.push(Box::new(LogIndexer::new(index)));
    if echo {
        processors.push(Box::new(EchoProcessor::new(io::stdout())));
    }
    Ok(processors)
}

/// Runs the pipeline with the error policy `settings` selects.
///
/// # Errors
///
/// Returns the error that stopped the pipeline.
pub fn ingest(
    source: Box<dyn EntrySource>,
    processors: &mut [Box<dyn Processor>],
    settings: &PipelineSection,
    cancel: &CancellationToken,
) -> Result<PipelineStats, PipelineError> {
    if settings.strict {
        Pipeline::new(source, Strict).run(processors, cancel)
    } else {
        let policy = Permissive {
            report: settings.show_parse_errors,
        };
        Pipeline::new(source, policy).run(processors, cancel)
    }
}
