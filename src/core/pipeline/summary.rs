//! Pipeline run summary
//!
//! Per-stage counters reported at the end of every run, successful or not.

use super::driver::PipelineState;
use super::stages::{ProducerReport, StreamKind, TransformReport, WriterReport};
use crate::domain::ExporterError;
use std::time::Duration;

/// Outcome of one pipeline run
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// Device-status records sent by all sources
    pub device_statuses_sent: u64,

    /// Treatment records sent by all sources
    pub treatments_sent: u64,

    /// Device-status records dropped as duplicate suggestions
    pub duplicates_skipped: u64,

    /// Points produced by both transformers
    pub points_emitted: u64,

    /// Empty points dropped by the writer
    pub empty_points_skipped: u64,

    /// Points written to the sink
    pub points_written: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Final pipeline state
    pub state: PipelineState,

    /// Root cause when the run failed
    pub error: Option<ExporterError>,
}

impl PipelineSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the run reached `Done`
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done && self.error.is_none()
    }

    /// Convert into a `Result`, surfacing the root cause of a failed run
    pub fn into_result(mut self) -> Result<Self, ExporterError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    pub(crate) fn add_producer(&mut self, report: &ProducerReport) {
        match report.stream {
            StreamKind::DeviceStatuses => self.device_statuses_sent += report.sent,
            StreamKind::Treatments => self.treatments_sent += report.sent,
        }
    }

    pub(crate) fn add_transformer(&mut self, report: &TransformReport) {
        self.points_emitted += report.points;
        self.duplicates_skipped += report.duplicates;
    }

    pub(crate) fn add_writer(&mut self, report: &WriterReport) {
        self.points_written += report.written;
        self.empty_points_skipped += report.empty_skipped;
    }

    /// Log the summary as one structured event
    pub fn log(&self) {
        tracing::info!(
            state = %self.state,
            device_statuses_sent = self.device_statuses_sent,
            treatments_sent = self.treatments_sent,
            duplicates_skipped = self.duplicates_skipped,
            points_emitted = self.points_emitted,
            empty_points_skipped = self.empty_points_skipped,
            points_written = self.points_written,
            duration_ms = self.duration.as_millis() as u64,
            "Pipeline finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_summary() {
        let summary = PipelineSummary::new();
        assert_eq!(summary.state, PipelineState::Idle);
        assert_eq!(summary.points_written, 0);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_counters_accumulate() {
        let mut summary = PipelineSummary::new();
        summary.add_producer(&ProducerReport {
            source: "mongo".to_string(),
            stream: StreamKind::DeviceStatuses,
            sent: 3,
        });
        summary.add_producer(&ProducerReport {
            source: "nightscout".to_string(),
            stream: StreamKind::DeviceStatuses,
            sent: 2,
        });
        summary.add_producer(&ProducerReport {
            source: "mongo".to_string(),
            stream: StreamKind::Treatments,
            sent: 4,
        });
        summary.add_transformer(&TransformReport {
            stream: StreamKind::DeviceStatuses,
            records: 5,
            points: 4,
            duplicates: 1,
        });
        summary.add_writer(&WriterReport {
            written: 3,
            empty_skipped: 1,
        });

        assert_eq!(summary.device_statuses_sent, 5);
        assert_eq!(summary.treatments_sent, 4);
        assert_eq!(summary.points_emitted, 4);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.points_written, 3);
        assert_eq!(summary.empty_points_skipped, 1);
    }

    #[test]
    fn test_into_result() {
        let mut summary = PipelineSummary::new();
        summary.state = PipelineState::Done;
        assert!(summary.is_success());
        assert!(summary.into_result().is_ok());

        let mut failed = PipelineSummary::new();
        failed.state = PipelineState::Failed;
        failed.error = Some(ExporterError::Cancelled);
        assert!(matches!(failed.into_result(), Err(ExporterError::Cancelled)));
    }
}
