//! Integration tests for the pipeline driver
//!
//! Sources are backed by the in-memory document store; the sink is a
//! recording writer defined below.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use ns_exporter::adapters::influx::{DryRunWriter, PointWriter};
use ns_exporter::adapters::mongo::{MemoryStore, MongoSource};
use ns_exporter::adapters::source::{DataSource, QueryWindow};
use ns_exporter::core::pipeline::{Pipeline, PipelineState, PipelineSummary};
use ns_exporter::domain::{ExporterError, FieldValue, InfluxError, Point, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Keeps every point it is handed
#[derive(Default)]
struct RecordingWriter {
    points: Mutex<Vec<Point>>,
}

impl RecordingWriter {
    fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    fn by_measurement(&self, measurement: &str) -> Vec<Point> {
        self.points()
            .into_iter()
            .filter(|p| p.measurement() == measurement)
            .collect()
    }
}

#[async_trait]
impl PointWriter for RecordingWriter {
    async fn write_point(&self, point: &Point) -> Result<()> {
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }
}

/// Accepts `accept` points, then rejects every write
struct RejectingWriter {
    accept: usize,
    seen: AtomicUsize,
}

#[async_trait]
impl PointWriter for RejectingWriter {
    async fn write_point(&self, _point: &Point) -> Result<()> {
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.accept {
            return Ok(());
        }
        Err(InfluxError::WriteRejected {
            status: 400,
            message: "partial write: field type conflict".to_string(),
        }
        .into())
    }
}

/// Never completes a write
struct StalledWriter;

#[async_trait]
impl PointWriter for StalledWriter {
    async fn write_point(&self, _point: &Point) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn status(created_at: &str, bg: i32, tick: Bson) -> Document {
    doc! {
        "created_at": created_at,
        "device": "openaps://rig",
        "openaps": {
            "iob": {"iob": 1.5, "basaliob": 0.5, "activity": 0.02, "time": created_at},
            "suggested": {
                "bg": bg,
                "tick": tick,
                "eventualBG": 110,
                "reason": "COB: 0, Dev: 1.2, BGI: -0.5, ISF: 50, CR: 8, Target: 100",
                "predBGs": {"IOB": [120, 115, 108]}
            }
        }
    }
}

fn carbs(created_at: &str, grams: f64) -> Document {
    doc! {"created_at": created_at, "eventType": "Meal Bolus", "carbs": grams, "insulin": 0.0}
}

fn mongo(store: MemoryStore) -> DataSource {
    MongoSource::new(Box::new(store), Some("alice".to_string())).into()
}

async fn run(sources: Vec<DataSource>, writer: Arc<dyn PointWriter>) -> PipelineSummary {
    run_with(sources, writer, CancellationToken::new(), 4).await
}

async fn run_with(
    sources: Vec<DataSource>,
    writer: Arc<dyn PointWriter>,
    cancel: CancellationToken,
    capacity: usize,
) -> PipelineSummary {
    let pipeline = Pipeline::new(sources, writer, cancel)
        .with_window(QueryWindow::unbounded())
        .with_channel_capacity(capacity);
    tokio::time::timeout(RUN_TIMEOUT, pipeline.run())
        .await
        .expect("pipeline did not terminate")
}

#[tokio::test]
async fn test_repeated_suggestion_written_once() {
    let store = MemoryStore::new().with_documents(
        "devicestatus",
        vec![
            status("2024-03-01T10:05:00Z", 120, Bson::String("5".to_string())),
            status("2024-03-01T10:00:00Z", 120, Bson::String("5".to_string())),
        ],
    );
    let writer = Arc::new(RecordingWriter::default());

    let summary = run(vec![mongo(store)], writer.clone()).await;

    assert!(summary.is_success(), "{:?}", summary.error);
    let points = writer.by_measurement("openaps");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].field("bg"), Some(&FieldValue::Float(120.0)));
    assert_eq!(summary.device_statuses_sent, 2);
    assert_eq!(summary.duplicates_skipped, 1);
    assert_eq!(summary.points_written, 1);
}

#[tokio::test]
async fn test_zero_tick_never_deduplicated() {
    let store = MemoryStore::new().with_documents(
        "devicestatus",
        vec![
            status("2024-03-01T10:05:00Z", 120, Bson::Int32(0)),
            status("2024-03-01T10:00:00Z", 120, Bson::Int32(0)),
        ],
    );
    let writer = Arc::new(RecordingWriter::default());

    let summary = run(vec![mongo(store)], writer.clone()).await;

    assert!(summary.is_success());
    assert_eq!(writer.by_measurement("openaps").len(), 2);
    assert_eq!(summary.duplicates_skipped, 0);
}

#[tokio::test]
async fn test_suggestion_derived_fields() {
    let store = MemoryStore::new().with_documents(
        "devicestatus",
        vec![status("2024-03-01T10:00:00Z", 130, Bson::String("-3".to_string()))],
    );
    let writer = Arc::new(RecordingWriter::default());

    run(vec![mongo(store)], writer.clone()).await;

    let point = &writer.by_measurement("openaps")[0];
    assert_eq!(point.field("tick"), Some(&FieldValue::Float(-3.0)));
    assert_eq!(point.field("pred_iob"), Some(&FieldValue::Float(108.0)));
    assert_eq!(point.field("dev"), Some(&FieldValue::Float(1.2)));
    assert_eq!(point.field("isf"), Some(&FieldValue::Float(50.0)));
    assert_eq!(point.field("cr"), Some(&FieldValue::Float(8.0)));
}

#[tokio::test]
async fn test_treatment_classification_end_to_end() {
    let store = MemoryStore::new().with_documents(
        "treatments",
        vec![
            carbs("2024-03-01T12:00:00Z", 30.0),
            doc! {"created_at": "2024-03-01T11:00:00Z", "eventType": "Site Change"},
            doc! {"created_at": "2024-03-01T10:00:00Z", "eventType": "Unknown Thing"},
        ],
    );
    let writer = Arc::new(RecordingWriter::default());

    let summary = run(vec![mongo(store)], writer.clone()).await;

    assert!(summary.is_success());
    assert_eq!(summary.treatments_sent, 3);
    assert_eq!(summary.points_emitted, 3);
    assert_eq!(summary.empty_points_skipped, 1);
    assert_eq!(summary.points_written, 2);

    let points = writer.by_measurement("treatments");
    let meal = points.iter().find(|p| p.tag("type") == Some("carbs")).unwrap();
    assert_eq!(meal.field("carbs"), Some(&FieldValue::Float(30.0)));
    assert!(meal.field("bolus").is_none());

    let site = points.iter().find(|p| p.field("notes").is_some()).unwrap();
    assert_eq!(site.field("notes"), Some(&FieldValue::String("Site Change".to_string())));
    assert!(site.tags().is_empty());
}

#[tokio::test]
async fn test_empty_sources_reach_done() {
    let writer = Arc::new(RecordingWriter::default());

    let summary = run(vec![mongo(MemoryStore::new())], writer.clone()).await;

    assert_eq!(summary.state, PipelineState::Done);
    assert!(summary.error.is_none());
    assert!(writer.points().is_empty());
}

#[tokio::test]
async fn test_multiple_sources_fan_in() {
    let first = MemoryStore::new()
        .with_documents(
            "devicestatus",
            vec![status("2024-03-01T10:00:00Z", 120, Bson::String("5".to_string()))],
        )
        .with_documents("treatments", vec![carbs("2024-03-01T10:00:00Z", 20.0)]);
    let second = MemoryStore::new()
        .with_documents(
            "devicestatus",
            vec![status("2024-03-02T10:00:00Z", 140, Bson::String("2".to_string()))],
        )
        .with_documents("treatments", vec![carbs("2024-03-02T10:00:00Z", 45.0)]);
    let third = MemoryStore::new();
    let (first_closes, second_closes, third_closes) = (first.clone(), second.clone(), third.clone());
    let writer = Arc::new(RecordingWriter::default());

    // Single-slot channels force producers to block on each other
    let summary = run_with(
        vec![mongo(first), mongo(second), mongo(third)],
        writer.clone(),
        CancellationToken::new(),
        1,
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(summary.device_statuses_sent, 2);
    assert_eq!(summary.treatments_sent, 2);
    assert_eq!(writer.points().len(), 4);
    assert_eq!(first_closes.close_count(), 1);
    assert_eq!(second_closes.close_count(), 1);
    assert_eq!(third_closes.close_count(), 1);
}

#[tokio::test]
async fn test_window_limits_each_stream() {
    let statuses: Vec<Document> = (0..10)
        .map(|i| status(&format!("2024-03-01T10:{i:02}:00Z"), 100 + i, Bson::Int32(0)))
        .collect();
    let store = MemoryStore::new().with_documents("devicestatus", statuses);
    let writer = Arc::new(RecordingWriter::default());

    let summary = Pipeline::new(vec![mongo(store)], writer.clone(), CancellationToken::new())
        .with_window(QueryWindow::new(3, 2))
        .run()
        .await;

    assert!(summary.is_success());
    assert_eq!(summary.device_statuses_sent, 3);
    let bgs: Vec<_> = writer
        .points()
        .iter()
        .filter_map(|p| p.field("bg").and_then(FieldValue::as_f64))
        .collect();
    assert_eq!(bgs, vec![107.0, 106.0, 105.0]);
}

#[tokio::test]
async fn test_decode_failure_fails_run() {
    let store = MemoryStore::new()
        .with_documents("treatments", vec![doc! {"eventType": "Site Change"}]);
    let closes = store.clone();

    let summary = run(vec![mongo(store)], Arc::new(DryRunWriter::new())).await;

    assert_eq!(summary.state, PipelineState::Failed);
    assert!(matches!(summary.error, Some(ExporterError::Decode(_))));
    assert_eq!(closes.close_count(), 1);
}

#[tokio::test]
async fn test_write_failure_fails_without_hang() {
    let treatments: Vec<Document> = (0..50)
        .map(|i| carbs(&format!("2024-03-01T{:02}:{:02}:00Z", i / 60, i % 60), 10.0))
        .collect();
    let store = MemoryStore::new().with_documents("treatments", treatments);
    let closes = store.clone();
    let writer = Arc::new(RejectingWriter {
        accept: 2,
        seen: AtomicUsize::new(0),
    });

    let summary = run_with(vec![mongo(store)], writer, CancellationToken::new(), 1).await;

    assert_eq!(summary.state, PipelineState::Failed);
    assert!(matches!(
        summary.error,
        Some(ExporterError::Influx(InfluxError::WriteRejected { status: 400, .. }))
    ));
    assert_eq!(closes.close_count(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_stalled_run() {
    let store = MemoryStore::new().with_documents(
        "treatments",
        vec![carbs("2024-03-01T10:00:00Z", 10.0), carbs("2024-03-01T11:00:00Z", 12.0)],
    );
    let closes = store.clone();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let summary = run_with(vec![mongo(store)], Arc::new(StalledWriter), cancel, 1).await;

    assert_eq!(summary.state, PipelineState::Failed);
    assert!(matches!(summary.error, Some(ExporterError::Cancelled)));
    assert_eq!(closes.close_count(), 1);
}

#[tokio::test]
async fn test_dry_run_counts_without_sink() {
    let store = MemoryStore::new()
        .with_documents(
            "devicestatus",
            vec![status("2024-03-01T10:00:00Z", 120, Bson::String("5".to_string()))],
        )
        .with_documents("treatments", vec![carbs("2024-03-01T10:00:00Z", 20.0)]);
    let writer = Arc::new(DryRunWriter::new());

    let summary = run(vec![mongo(store)], writer.clone()).await;

    assert!(summary.is_success());
    assert_eq!(writer.count(), 2);
    assert_eq!(summary.points_written, 2);
}
