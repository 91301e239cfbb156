//! Nightscout MongoDB source
//!
//! Reads the `devicestatus` and `treatments` collections newest first. Each
//! document is decoded in two phases: a structured BSON decode, then raw
//! lookups for `openaps.suggested.tick`, `openaps.iob.time` and `created_at`.

use super::store::{DocumentStore, DocumentStream, FindQuery};
use crate::adapters::source::{forward, QueryWindow, RecordSource};
use crate::domain::decode::{parse_rfc3339, RawTick};
use crate::domain::{DeviceStatusRecord, ExporterError, Result, TreatmentRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEVICE_STATUS_COLLECTION: &str = "devicestatus";
pub const TREATMENTS_COLLECTION: &str = "treatments";

/// Local-database source
pub struct MongoSource {
    store: Box<dyn DocumentStore>,
    user: Option<String>,
}

impl MongoSource {
    /// Create a source over `store`, attaching `user` to every record
    pub fn new(store: Box<dyn DocumentStore>, user: Option<String>) -> Self {
        Self { store, user }
    }

    async fn open(&self, query: FindQuery, cancel: &CancellationToken) -> Result<DocumentStream> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExporterError::Cancelled),
            cursor = self.store.find(query) => cursor,
        }
    }

    fn query(collection: &str, window: QueryWindow) -> FindQuery {
        FindQuery::new(collection)
            .sort(doc! {"created_at": -1})
            .limit(window.limit())
            .skip(window.skip())
    }
}

async fn next_document(
    cursor: &mut DocumentStream,
    cancel: &CancellationToken,
) -> Result<Option<Document>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExporterError::Cancelled),
        next = cursor.try_next() => next,
    }
}

/// Raw `openaps.suggested.tick` lookup on a BSON document
pub fn tick_from_bson(document: &Document) -> RawTick<'_> {
    let tick = document
        .get_document("openaps")
        .and_then(|openaps| openaps.get_document("suggested"))
        .ok()
        .and_then(|suggested| suggested.get("tick"));

    match tick {
        Some(Bson::String(s)) => RawTick::Text(s),
        Some(Bson::Int32(i)) => RawTick::Integer(i64::from(*i)),
        Some(Bson::Int64(i)) => RawTick::Integer(*i),
        _ => RawTick::Missing,
    }
}

/// Raw `created_at` lookup on a BSON document
///
/// Accepts the legacy RFC 3339 string encoding and native BSON datetimes.
pub fn created_at_from_bson(document: &Document) -> Result<DateTime<Utc>> {
    match document.get("created_at") {
        Some(Bson::String(s)) => parse_rfc3339(s),
        Some(Bson::DateTime(dt)) => from_bson_datetime(*dt, "created_at"),
        Some(other) => Err(ExporterError::Decode(format!(
            "created_at must be a string or datetime, got {other}"
        ))),
        None => Err(ExporterError::Decode("created_at is missing".to_string())),
    }
}

fn from_bson_datetime(value: bson::DateTime, field: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value.timestamp_millis())
        .ok_or_else(|| ExporterError::Decode(format!("{field} {value} is out of range")))
}

/// Rewrite a native BSON datetime `openaps.iob.time` to its RFC 3339 form
///
/// The structured decode only reads the string encoding.
fn normalize_iob_time(document: &mut Document) -> Result<()> {
    let Ok(iob) = document
        .get_document_mut("openaps")
        .and_then(|openaps| openaps.get_document_mut("iob"))
    else {
        return Ok(());
    };

    let native = match iob.get("time") {
        Some(Bson::DateTime(dt)) => *dt,
        _ => return Ok(()),
    };
    let time = from_bson_datetime(native, "openaps.iob.time")?;
    iob.insert("time", time.to_rfc3339());
    Ok(())
}

/// Two-phase decode of a `devicestatus` document
pub fn decode_device_status(mut document: Document) -> Result<DeviceStatusRecord> {
    let tick = tick_from_bson(&document).value();
    normalize_iob_time(&mut document)?;
    let mut record: DeviceStatusRecord = bson::from_document(document)?;
    record.set_tick(tick);
    Ok(record)
}

/// Two-phase decode of a `treatments` document
pub fn decode_treatment(document: Document) -> Result<TreatmentRecord> {
    let created_at = created_at_from_bson(&document)?;
    let mut record: TreatmentRecord = bson::from_document(document)?;
    record.created_at = created_at;
    Ok(record)
}

#[async_trait]
impl RecordSource for MongoSource {
    fn name(&self) -> &str {
        "mongo"
    }

    async fn load_device_statuses(
        &self,
        sender: &mpsc::Sender<DeviceStatusRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let query = Self::query(DEVICE_STATUS_COLLECTION, window)
            .filter(doc! {"openaps": {"$exists": true}});
        let mut cursor = self.open(query, cancel).await?;

        let mut sent = 0u64;
        while let Some(document) = next_document(&mut cursor, cancel).await? {
            let mut record = decode_device_status(document)?;
            record.user = self.user.clone();
            tracing::trace!(time = %record.openaps.iob.time, "Read device status");
            forward(sender, record, "device statuses", cancel).await?;
            sent += 1;
        }

        Ok(sent)
    }

    async fn load_treatments(
        &self,
        sender: &mpsc::Sender<TreatmentRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let query = Self::query(TREATMENTS_COLLECTION, window);
        let mut cursor = self.open(query, cancel).await?;

        let mut sent = 0u64;
        while let Some(document) = next_document(&mut cursor, cancel).await? {
            let mut record = decode_treatment(document)?;
            record.user = self.user.clone();
            tracing::trace!(created_at = %record.created_at, event_type = %record.event_type, "Read treatment");
            forward(sender, record, "treatments", cancel).await?;
            sent += 1;
        }

        Ok(sent)
    }

    async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}
