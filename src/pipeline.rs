//! Source → middleware chain → sink orchestration.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::error::Result;
use crate::middleware::Middleware;
use crate::streaming::{DataStream, Session};

/// Counters for one [`Pipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Envelopes pulled from the source.
    pub records_read: u64,
    /// Envelopes written to the sink.
    pub records_written: u64,
    /// Source envelopes for which the chain produced nothing.
    pub records_dropped: u64,
    /// Wall time of the run, open and close included.
    pub elapsed: Duration,
}

/// An ordered middleware chain.
///
/// The pipeline borrows its stages, so stateful middlewares (counters,
/// hashers, timers) can be inspected once the pipeline is dropped.
///
/// ```
/// use streamflow_core::middleware::{BytesToJson, JsonToBytes, RowCounter};
/// use streamflow_core::{Envelope, Pipeline};
///
/// let mut decode = BytesToJson::new();
/// let mut count = RowCounter::new();
/// let mut encode = JsonToBytes::new();
/// let out = Pipeline::new()
///     .with(&mut decode)
///     .with(&mut count)
///     .with(&mut encode)
///     .process(Envelope::new(br#"{"a":1}"#.as_slice()))?;
///
/// assert_eq!(out.len(), 1);
/// assert_eq!(count.count(), 1);
/// # Ok::<(), streamflow_core::StreamError>(())
/// ```
#[derive(Default)]
pub struct Pipeline<'m> {
    chain: Vec<&'m mut dyn Middleware>,
}

impl<'m> Pipeline<'m> {
    /// Creates an empty chain; envelopes pass through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with(mut self, middleware: &'m mut dyn Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Appends a stage in place.
    pub fn push(&mut self, middleware: &'m mut dyn Middleware) {
        self.chain.push(middleware);
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Runs one envelope through every stage.
    ///
    /// Each stage is applied to every envelope the previous stage produced,
    /// in order. Processing stops as soon as a stage leaves nothing.
    ///
    /// # Errors
    ///
    /// Propagates the first stage error; the record is abandoned.
    pub fn process(&mut self, envelope: Envelope) -> Result<Vec<Envelope>> {
        let mut working = vec![envelope];
        for stage in &mut self.chain {
            let mut next = Vec::with_capacity(working.len());
            for envelope in working {
                next.extend(stage.apply(envelope)?);
            }
            if next.is_empty() {
                debug!(stage = stage.name(), "record dropped");
                return Ok(next);
            }
            working = next;
        }
        Ok(working)
    }

    /// Opens both streams, pumps every source envelope through the chain into
    /// the sink, and closes both streams.
    ///
    /// Each source envelope, with all of its fan-out, is written before the
    /// next one is pulled. Both streams are closed on every exit path.
    ///
    /// # Errors
    ///
    /// Propagates open, read, stage, write, and close errors.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<RunReport>
    where
        S: DataStream + ?Sized,
        K: DataStream + ?Sized,
    {
        let started = Instant::now();
        info!(
            source = source.resource(),
            sink = sink.resource(),
            stages = self.chain.len(),
            "pipeline started"
        );

        let mut report = RunReport::default();
        let mut source = Session::open(source)?;
        let mut sink = Session::open(sink)?;

        for item in source.read()? {
            let envelope = item?;
            report.records_read += 1;

            let survivors = self.process(envelope)?;
            if survivors.is_empty() {
                report.records_dropped += 1;
            }
            for envelope in &survivors {
                sink.write(envelope)?;
                report.records_written += 1;
            }
        }

        sink.finish()?;
        source.finish()?;
        report.elapsed = started.elapsed();

        info!(
            read = report.records_read,
            written = report.records_written,
            dropped = report.records_dropped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.chain.iter().map(|stage| stage.name()))
            .finish()
    }
}
