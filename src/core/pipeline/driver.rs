//! Pipeline driver
//!
//! Wires sources, transformers and the writer into one run and enforces the
//! closing order: producers are joined before the record channels close,
//! transformers are joined before the point channel closes, and the writer is
//! joined last.

use super::stages::{start_sources, start_transformers, start_writer, StageOutcome};
use super::summary::PipelineSummary;
use crate::adapters::influx::PointWriter;
use crate::adapters::source::{release_sources, DataSource, QueryWindow, RecordSource};
use crate::domain::ExporterError;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default capacity of every pipeline channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Idle,
    SourcesRunning,
    TransformersRunning,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::SourcesRunning => "sources_running",
            PipelineState::TransformersRunning => "transformers_running",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One end-to-end execution over a set of sources and a writer
///
/// # Example
///
/// ```rust,no_run
/// use ns_exporter::adapters::influx::DryRunWriter;
/// use ns_exporter::adapters::mongo::{MemoryStore, MongoSource};
/// use ns_exporter::adapters::source::QueryWindow;
/// use ns_exporter::core::pipeline::Pipeline;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let source = MongoSource::new(Box::new(MemoryStore::new()), None);
/// let summary = Pipeline::new(vec![source.into()], Arc::new(DryRunWriter::new()), CancellationToken::new())
///     .with_window(QueryWindow::new(1000, 0))
///     .run()
///     .await;
/// assert!(summary.is_success());
/// # }
/// ```
pub struct Pipeline {
    sources: Vec<DataSource>,
    writer: Arc<dyn PointWriter>,
    window: QueryWindow,
    channel_capacity: usize,
    cancel: CancellationToken,
    state: PipelineState,
}

impl Pipeline {
    /// Create an idle pipeline
    ///
    /// Cancelling `cancel` aborts the run; the pipeline never cancels the
    /// caller's token itself.
    pub fn new(sources: Vec<DataSource>, writer: Arc<dyn PointWriter>, cancel: CancellationToken) -> Self {
        Self {
            sources,
            writer,
            window: QueryWindow::unbounded(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            cancel,
            state: PipelineState::Idle,
        }
    }

    pub fn with_window(mut self, window: QueryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, to: PipelineState) {
        if self.state == to || self.state == PipelineState::Failed {
            return;
        }
        tracing::info!(from = %self.state, to = %to, "Pipeline state changed");
        self.state = to;
    }

    fn absorb<R>(&mut self, outcome: &mut StageOutcome<R>, errors: &mut Vec<ExporterError>) {
        if !outcome.errors.is_empty() {
            self.transition(PipelineState::Failed);
            errors.append(&mut outcome.errors);
        }
    }

    /// Run to completion
    ///
    /// Never returns early: on failure every started task is joined and every
    /// source released before the summary is returned. The summary carries the
    /// root-cause error, preferring a primary failure over the cancellations
    /// and closed channels it causes downstream.
    pub async fn run(mut self) -> PipelineSummary {
        let started = Instant::now();
        let run_token = self.cancel.child_token();
        let mut summary = PipelineSummary::new();
        let mut errors = Vec::new();

        tracing::info!(
            sources = self.sources.len(),
            limit = self.window.limit,
            skip = self.window.skip,
            "Starting pipeline"
        );

        for source in &mut self.sources {
            if let Err(e) = source.authorize(&run_token).await {
                crate::log_error_with_context!(&e, "Source authorization failed");
                errors.push(e);
                break;
            }
        }

        if !errors.is_empty() {
            self.transition(PipelineState::Failed);
            release_sources(&self.sources).await;
            return self.finish(summary, errors, started);
        }

        self.transition(PipelineState::SourcesRunning);
        let sources = std::mem::take(&mut self.sources);
        let (source_stage, device_rx, treatment_rx) =
            start_sources(sources, self.window, self.channel_capacity, &run_token);

        let (transform_stage, points_rx) =
            match start_transformers(device_rx, treatment_rx, self.channel_capacity, &run_token) {
                Ok(started) => started,
                Err(e) => {
                    run_token.cancel();
                    errors.push(e);
                    self.transition(PipelineState::Failed);
                    let mut outcome = source_stage.join().await;
                    for report in &outcome.reports {
                        summary.add_producer(report);
                    }
                    self.absorb(&mut outcome, &mut errors);
                    return self.finish(summary, errors, started);
                }
            };
        self.transition(PipelineState::TransformersRunning);

        let writer_stage = start_writer(points_rx, Arc::clone(&self.writer), &run_token);

        let mut producers = source_stage.join().await;
        for report in &producers.reports {
            summary.add_producer(report);
        }
        self.absorb(&mut producers, &mut errors);

        let mut transformers = transform_stage.join().await;
        for report in &transformers.reports {
            summary.add_transformer(report);
        }
        self.absorb(&mut transformers, &mut errors);
        self.transition(PipelineState::Draining);

        let mut writer = writer_stage.join().await;
        for report in &writer.reports {
            summary.add_writer(report);
        }
        self.absorb(&mut writer, &mut errors);

        self.finish(summary, errors, started)
    }

    fn finish(
        mut self,
        mut summary: PipelineSummary,
        mut errors: Vec<ExporterError>,
        started: Instant,
    ) -> PipelineSummary {
        summary.duration = started.elapsed();

        if errors.is_empty() {
            self.transition(PipelineState::Done);
        } else {
            self.transition(PipelineState::Failed);
            let root = errors.iter().position(|e| !e.is_secondary()).unwrap_or(0);
            let error = errors.swap_remove(root);
            for other in &errors {
                tracing::debug!(error = %other, "Secondary pipeline error");
            }
            crate::log_error_with_context!(&error, "Pipeline failed");
            summary.error = Some(error);
        }

        summary.state = self.state;
        summary
    }
}
