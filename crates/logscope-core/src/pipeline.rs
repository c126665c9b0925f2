//! The entry pipeline.
//!
//! This module provides:
//! - [`Processor`]: a consumer of entries returning [`Flow`]
//! - [`ErrorPolicy`]: decides whether a recoverable error aborts the run
//! - [`Pipeline`]: drives a source through an ordered processor list
//!
//! A run ends with `Ok(PipelineStats)` at end of stream or with the error
//! that stopped it. Cancellation is checked before each entry is dispatched
//! and always aborts, bypassing the error policy.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PipelineError, ProcessError, SourceError};
use crate::source::EntrySource;
use crate::types::LogEntry;

/// What the pipeline should do after a processor accepted an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hand the entry to the next processor.
    Continue,
    /// Stop processing this entry; move on to the next one.
    Skip,
}

/// A stage that consumes entries.
pub trait Processor: Send {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Processes one entry.
    fn process(&mut self, entry: &LogEntry) -> Result<Flow, ProcessError>;
}

/// Decides whether a recoverable error stops the pipeline.
///
/// Returning `Ok(())` drops the error and resumes with the next entry.
pub trait ErrorPolicy: Send {
    /// Handles a parse or processor error.
    fn handle(&mut self, error: PipelineError) -> Result<(), PipelineError>;
}

impl<F> ErrorPolicy for F
where
    F: FnMut(PipelineError) -> Result<(), PipelineError> + Send,
{
    fn handle(&mut self, error: PipelineError) -> Result<(), PipelineError> {
        self(error)
    }
}

/// Aborts on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strict;

impl ErrorPolicy for Strict {
    fn handle(&mut self, error: PipelineError) -> Result<(), PipelineError> {
        Err(error)
    }
}

/// Drops every error, optionally logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive {
    /// Log dropped errors at warn level.
    pub report: bool,
}

impl Permissive {
    /// Drops errors silently.
    #[must_use]
    pub const fn silent() -> Self {
        Self { report: false }
    }

    /// Drops errors after logging them.
    #[must_use]
    pub const fn reporting() -> Self {
        Self { report: true }
    }
}

impl ErrorPolicy for Permissive {
    fn handle(&mut self, error: PipelineError) -> Result<(), PipelineError> {
        if self.report {
            match &error {
                PipelineError::Source(SourceError::Parse { line, fragment, reason }) => {
                    warn!(line, fragment = %fragment, reason = %reason, "Skipping unparseable line");
                }
                other => warn!(error = %other, "Skipping entry"),
            }
        }
        Ok(())
    }
}

/// Counters for one pipeline run.
/// Counters of a finished pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Entries parsed successfully.
    pub entries: u64,
    /// Entries that went through every processor.
    pub processed: u64,
    /// Entries a processor skipped.
    pub skipped: u64,
    /// Errors the policy recovered from.
    pub recovered: u64,
}

/// Drives an entry source through a list of processors.
pub struct Pipeline<S, P> {
    source: S,
    policy: P,
}

impl<S: EntrySource, P: ErrorPolicy> Pipeline<S, P> {
    /// Creates a pipeline over `source` using `policy` for recoverable errors.
    pub const fn new(source: S, policy: P) -> Self {
        Self { source, policy }
    }

    /// Runs until the source ends, an error is not recovered, or `cancel` fires.
    ///
    /// This blocks on the source; async callers run it on a blocking thread.
    pub fn run(
        mut self,
        processors: &mut [Box<dyn Processor>],
        cancel: &CancellationToken,
    ) -> Result<PipelineStats, PipelineError> {
        let mut stats = PipelineStats::default();

        for next in self.source.by_ref() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    self.policy.handle(e.into())?;
                    stats.recovered += 1;
                    continue;
                }
            };
            stats.entries += 1;

            if cancel.is_cancelled() {
                debug!(entries = stats.entries, "Pipeline cancelled");
                return Err(PipelineError::Cancelled);
            }

            match dispatch(processors, &entry) {
                Ok(Flow::Continue) => stats.processed += 1,
                Ok(Flow::Skip) => stats.skipped += 1,
                Err(e) => {
                    self.policy.handle(e)?;
                    stats.recovered += 1;
                }
            }
        }

        debug!(
            entries = stats.entries,
            processed = stats.processed,
            skipped = stats.skipped,
            recovered = stats.recovered,
            "Pipeline reached end of stream"
        );
        Ok(stats)
    }
}

fn dispatch(processors: &mut [Box<dyn Processor>], entry: &LogEntry) -> Result<Flow, PipelineError> {
    for processor in processors.iter_mut() {
        match processor.process(entry) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Skip) => return Ok(Flow::Skip),
            Err(source) => {
                return Err(PipelineError::Processor {
                    processor: processor.name(),
                    source,
                });
            }
        }
    }
    Ok(Flow::Continue)
}
