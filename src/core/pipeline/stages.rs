//! Pipeline stages
//!
//! Each `start_*` call spawns the tasks of one stage and returns a handle that
//! owns them. Handles replace shared completion counters: joining a handle
//! waits for every task of the stage, then drops the stage's retained sender,
//! which is what closes the downstream channel. Tasks only ever hold clones of
//! a sender, so a channel closes exactly once, after its last producer is done.
//!
//! Any task error cancels the run token so blocked peers return promptly.

use crate::adapters::influx::PointWriter;
use crate::adapters::source::{forward, DataSource, QueryWindow, RecordSource};
use crate::core::transform::{treatment, DeviceStatusTransformer};
use crate::domain::{DeviceStatusRecord, ExporterError, Point, Result, TreatmentRecord};
use crate::log_stage_complete;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

const POINTS_CHANNEL: &str = "points";

/// Record stream produced by a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamKind {
    #[default]
    DeviceStatuses,
    Treatments,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::DeviceStatuses => write!(f, "device statuses"),
            StreamKind::Treatments => write!(f, "treatments"),
        }
    }
}

/// Result of one producer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub source: String,
    pub stream: StreamKind,
    pub sent: u64,
}

/// Result of one transformer task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub stream: StreamKind,
    pub records: u64,
    pub points: u64,
    pub duplicates: u64,
}

/// Result of the writer task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub written: u64,
    pub empty_skipped: u64,
}

/// Counts a task reached, with the error that stopped it early
type Partial<R> = (R, Result<()>);

/// Reports and errors collected while joining a stage
#[derive(Debug)]
pub struct StageOutcome<R> {
    pub reports: Vec<R>,
    pub errors: Vec<ExporterError>,
}

impl<R> Default for StageOutcome<R> {
    fn default() -> Self {
        Self {
            reports: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<R> StageOutcome<R> {
    fn record(&mut self, joined: std::result::Result<Result<R>, JoinError>) {
        match joined {
            Ok(Ok(report)) => self.reports.push(report),
            Ok(Err(e)) => self.errors.push(e),
            Err(e) => self.errors.push(join_failure(e)),
        }
    }

    /// Keep the counts of a task even when it failed
    fn record_partial(&mut self, joined: std::result::Result<Partial<R>, JoinError>) {
        match joined {
            Ok((report, result)) => {
                self.reports.push(report);
                if let Err(e) = result {
                    self.errors.push(e);
                }
            }
            Err(e) => self.errors.push(join_failure(e)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

fn join_failure(e: JoinError) -> ExporterError {
    ExporterError::Pipeline(format!("Pipeline task failed: {e}"))
}

fn cancel_on_error<T>(cancel: &CancellationToken, result: Result<T>) -> Result<T> {
    if let Err(ref e) = result {
        if !cancel.is_cancelled() {
            tracing::error!(error = %e, "Pipeline task failed, cancelling run");
            cancel.cancel();
        }
    }
    result
}

/// Run `task`, cancelling the run if it fails
async fn guarded<R>(cancel: CancellationToken, task: impl Future<Output = Result<R>>) -> Result<R> {
    cancel_on_error(&cancel, task.await)
}

/// Like [`guarded`], for tasks that report their counts on failure too
async fn guarded_partial<R>(cancel: CancellationToken, task: impl Future<Output = Partial<R>>) -> Partial<R> {
    let (report, result) = task.await;
    (report, cancel_on_error(&cancel, result))
}

/// Receive the next item, giving up if the run is cancelled first
async fn receive<T>(receiver: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Result<Option<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExporterError::Cancelled),
        item = receiver.recv() => Ok(item),
    }
}

/// Running producers of every configured source
pub struct SourceStage {
    tasks: JoinSet<Result<ProducerReport>>,
    sources: Vec<Arc<DataSource>>,
    device_statuses: mpsc::Sender<DeviceStatusRecord>,
    treatments: mpsc::Sender<TreatmentRecord>,
}

/// Start two producers per source, fanned into one channel per record type
pub fn start_sources(
    sources: Vec<DataSource>,
    window: QueryWindow,
    capacity: usize,
    cancel: &CancellationToken,
) -> (
    SourceStage,
    mpsc::Receiver<DeviceStatusRecord>,
    mpsc::Receiver<TreatmentRecord>,
) {
    let (device_tx, device_rx) = mpsc::channel(capacity);
    let (treatment_tx, treatment_rx) = mpsc::channel(capacity);
    let mut tasks = JoinSet::new();
    let sources: Vec<Arc<DataSource>> = sources.into_iter().map(Arc::new).collect();

    for source in &sources {
        let (src, tx, token) = (Arc::clone(source), device_tx.clone(), cancel.clone());
        tasks.spawn(guarded(cancel.clone(), async move {
            let sent = src.load_device_statuses(&tx, window, &token).await?;
            log_stage_complete!("source", format!("{}/{}", src.name(), StreamKind::DeviceStatuses), sent);
            Ok(ProducerReport {
                source: src.name().to_string(),
                stream: StreamKind::DeviceStatuses,
                sent,
            })
        }));

        let (src, tx, token) = (Arc::clone(source), treatment_tx.clone(), cancel.clone());
        tasks.spawn(guarded(cancel.clone(), async move {
            let sent = src.load_treatments(&tx, window, &token).await?;
            log_stage_complete!("source", format!("{}/{}", src.name(), StreamKind::Treatments), sent);
            Ok(ProducerReport {
                source: src.name().to_string(),
                stream: StreamKind::Treatments,
                sent,
            })
        }));
    }

    tracing::info!(
        sources = sources.len(),
        producers = tasks.len(),
        "Sources started"
    );

    let stage = SourceStage {
        tasks,
        sources,
        device_statuses: device_tx,
        treatments: treatment_tx,
    };
    (stage, device_rx, treatment_rx)
}

impl SourceStage {
    /// Wait for every producer, close both record channels, then release each source once
    pub async fn join(self) -> StageOutcome<ProducerReport> {
        let SourceStage {
            mut tasks,
            sources,
            device_statuses,
            treatments,
        } = self;

        let mut outcome = StageOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            outcome.record(joined);
        }

        drop(device_statuses);
        drop(treatments);
        tracing::debug!("Record channels closed");

        for source in sources {
            if let Err(e) = source.close().await {
                tracing::warn!(source = source.name(), error = %e, "Failed to close source");
                outcome.errors.push(e);
            }
        }

        outcome
    }
}

/// Running transformers
pub struct TransformStage {
    tasks: JoinSet<Partial<TransformReport>>,
    points: mpsc::Sender<Point>,
}

/// Start both transformers, fanned into one point channel
///
/// # Errors
///
/// Returns an error if a transformer cannot be constructed; nothing is
/// spawned in that case.
pub fn start_transformers(
    mut device_statuses: mpsc::Receiver<DeviceStatusRecord>,
    mut treatments: mpsc::Receiver<TreatmentRecord>,
    capacity: usize,
    cancel: &CancellationToken,
) -> Result<(TransformStage, mpsc::Receiver<Point>)> {
    let mut device_transformer = DeviceStatusTransformer::new()?;
    let (points_tx, points_rx) = mpsc::channel(capacity);
    let mut tasks = JoinSet::new();

    let (tx, token) = (points_tx.clone(), cancel.clone());
    tasks.spawn(guarded_partial(cancel.clone(), async move {
        let mut report = TransformReport {
            stream: StreamKind::DeviceStatuses,
            ..Default::default()
        };
        let result = async {
            while let Some(record) = receive(&mut device_statuses, &token).await? {
                report.records += 1;
                if let Some(point) = device_transformer.transform(&record) {
                    forward(&tx, point, POINTS_CHANNEL, &token).await?;
                    report.points += 1;
                }
            }
            Ok::<_, ExporterError>(())
        }
        .await;

        report.duplicates = device_transformer.duplicates();
        if result.is_ok() {
            log_stage_complete!("transform", StreamKind::DeviceStatuses, report.points);
        }
        (report, result)
    }));

    let (tx, token) = (points_tx.clone(), cancel.clone());
    tasks.spawn(guarded_partial(cancel.clone(), async move {
        let mut report = TransformReport {
            stream: StreamKind::Treatments,
            ..Default::default()
        };
        let result = async {
            while let Some(record) = receive(&mut treatments, &token).await? {
                report.records += 1;
                forward(&tx, treatment::transform(&record), POINTS_CHANNEL, &token).await?;
                report.points += 1;
            }
            Ok::<_, ExporterError>(())
        }
        .await;

        if result.is_ok() {
            log_stage_complete!("transform", StreamKind::Treatments, report.points);
        }
        (report, result)
    }));

    Ok((
        TransformStage {
            tasks,
            points: points_tx,
        },
        points_rx,
    ))
}

impl TransformStage {
    /// Wait for both transformers, then close the point channel
    pub async fn join(self) -> StageOutcome<TransformReport> {
        let TransformStage { mut tasks, points } = self;

        let mut outcome = StageOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            outcome.record_partial(joined);
        }

        drop(points);
        tracing::debug!("Point channel closed");
        outcome
    }
}

/// Running sink writer
pub struct WriterStage {
    handle: JoinHandle<Partial<WriterReport>>,
}

/// Start the writer: drop empty points, write the rest one by one
pub fn start_writer(
    mut points: mpsc::Receiver<Point>,
    writer: Arc<dyn PointWriter>,
    cancel: &CancellationToken,
) -> WriterStage {
    let token = cancel.clone();
    let handle = tokio::spawn(guarded_partial(cancel.clone(), async move {
        let mut report = WriterReport::default();
        let result = async {
            while let Some(point) = receive(&mut points, &token).await? {
                if point.is_empty() {
                    report.empty_skipped += 1;
                    tracing::debug!(
                        measurement = point.measurement(),
                        time = %point.time(),
                        "Skipping empty point"
                    );
                    continue;
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ExporterError::Cancelled),
                    written = writer.write_point(&point) => written?,
                }
                report.written += 1;
                tracing::trace!(measurement = point.measurement(), time = %point.time(), "Point written");
            }
            Ok::<_, ExporterError>(())
        }
        .await;

        if result.is_ok() {
            log_stage_complete!("writer", "sink", report.written);
        }
        (report, result)
    }));

    WriterStage { handle }
}

impl WriterStage {
    /// Wait for the writer to drain the point channel
    pub async fn join(self) -> StageOutcome<WriterReport> {
        let mut outcome = StageOutcome::default();
        outcome.record_partial(self.handle.await);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IobSnapshot, Suggestion};
    use chrono::{TimeZone, Utc};

    fn record(bg: f64, tick: f64) -> DeviceStatusRecord {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        DeviceStatusRecord::new(IobSnapshot::new(1.5, 0.4, 0.02, time)).with_suggestion(Suggestion {
            bg,
            tick,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_cancelled_transformers_keep_their_counts() {
        let cancel = CancellationToken::new();
        let (device_tx, device_rx) = mpsc::channel(8);
        let (_treatment_tx, treatment_rx) = mpsc::channel(8);
        let (stage, mut points) = start_transformers(device_rx, treatment_rx, 8, &cancel).unwrap();

        device_tx.send(record(120.0, 5.0)).await.unwrap();
        device_tx.send(record(120.0, 5.0)).await.unwrap();
        device_tx.send(record(125.0, 5.0)).await.unwrap();
        assert!(points.recv().await.is_some());
        assert!(points.recv().await.is_some());

        cancel.cancel();
        let outcome = stage.join().await;

        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(ExporterError::is_secondary));
        let devices = outcome
            .reports
            .iter()
            .find(|r| r.stream == StreamKind::DeviceStatuses)
            .unwrap();
        assert_eq!(devices.records, 3);
        assert_eq!(devices.points, 2);
        assert_eq!(devices.duplicates, 1);
        assert_eq!(outcome.reports.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_writer_keeps_its_counts() {
        struct FailSecond(std::sync::atomic::AtomicU64);

        #[async_trait::async_trait]
        impl PointWriter for FailSecond {
            async fn write_point(&self, _point: &Point) -> Result<()> {
                if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                    return Err(ExporterError::Other("sink down".to_string()));
                }
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);
        let writer = Arc::new(FailSecond(std::sync::atomic::AtomicU64::new(0)));
        let stage = start_writer(rx, writer, &cancel);

        let time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut point = Point::new("openaps", time);
        point.add_field("iob", 1.0);
        tx.send(Point::new("openaps", time)).await.unwrap();
        tx.send(point.clone()).await.unwrap();
        tx.send(point).await.unwrap();

        let outcome = stage.join().await;
        assert_eq!(
            outcome.reports,
            vec![WriterReport {
                written: 1,
                empty_skipped: 1
            }]
        );
        assert!(matches!(outcome.errors.as_slice(), [ExporterError::Other(_)]));
        assert!(cancel.is_cancelled());
    }
}
