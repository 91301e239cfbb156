//! Record source abstraction
//!
//! This module defines the capability every upstream backend implements and
//! the sum type the pipeline dispatches through.

use crate::adapters::mongo::MongoSource;
use crate::adapters::nightscout::NightscoutSource;
use crate::domain::{DeviceStatusRecord, ExporterError, Result, TreatmentRecord};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Row window applied to each stream independently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    /// Maximum rows; `<= 0` is unbounded
    pub limit: i64,

    /// Rows to skip; `<= 0` is no offset
    pub skip: i64,
}

impl QueryWindow {
    pub fn new(limit: i64, skip: i64) -> Self {
        Self { limit, skip }
    }

    /// Unbounded window with no offset
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Positive row limit, if any
    pub fn limit(&self) -> Option<u64> {
        u64::try_from(self.limit).ok().filter(|l| *l > 0)
    }

    /// Positive row offset, if any
    pub fn skip(&self) -> Option<u64> {
        u64::try_from(self.skip).ok().filter(|s| *s > 0)
    }
}

/// Upstream backend producing device-status and treatment records
///
/// Both loads are independent read-only queries on the same instance and may
/// run concurrently. Each stream is produced newest first. Implementations
/// send into the provided channel and must never close it: the channel is
/// shared with other producers and owned by the pipeline driver.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Authenticate against the backend
    ///
    /// Backends without an authorization step keep the default no-op.
    async fn authorize(&mut self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Stream device-status records into `sender`, returning how many were sent
    ///
    /// # Errors
    ///
    /// Transport, authentication and decode failures are fatal for the run.
    /// Returns [`ExporterError::Cancelled`] if `cancel` fires first.
    async fn load_device_statuses(
        &self,
        sender: &mpsc::Sender<DeviceStatusRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Stream treatment records into `sender`, returning how many were sent
    ///
    /// # Errors
    ///
    /// Same policy as [`RecordSource::load_device_statuses`].
    async fn load_treatments(
        &self,
        sender: &mpsc::Sender<TreatmentRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Release backend resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Configured source backend
pub enum DataSource {
    /// Nightscout MongoDB
    Mongo(MongoSource),
    /// Nightscout REST API
    Nightscout(NightscoutSource),
}

impl DataSource {
    fn inner(&self) -> &dyn RecordSource {
        match self {
            DataSource::Mongo(source) => source,
            DataSource::Nightscout(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RecordSource {
        match self {
            DataSource::Mongo(source) => source,
            DataSource::Nightscout(source) => source,
        }
    }
}

impl From<MongoSource> for DataSource {
    fn from(source: MongoSource) -> Self {
        DataSource::Mongo(source)
    }
}

impl From<NightscoutSource> for DataSource {
    fn from(source: NightscoutSource) -> Self {
        DataSource::Nightscout(source)
    }
}

#[async_trait]
impl RecordSource for DataSource {
    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn authorize(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.inner_mut().authorize(cancel).await
    }

    async fn load_device_statuses(
        &self,
        sender: &mpsc::Sender<DeviceStatusRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.inner().load_device_statuses(sender, window, cancel).await
    }

    async fn load_treatments(
        &self,
        sender: &mpsc::Sender<TreatmentRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.inner().load_treatments(sender, window, cancel).await
    }

    async fn close(&self) -> Result<()> {
        self.inner().close().await
    }
}

/// Send one item downstream, giving up if the run is cancelled first
///
/// # Errors
///
/// [`ExporterError::Cancelled`] on cancellation, [`ExporterError::ChannelClosed`]
/// if every receiver is gone.
pub async fn forward<T: Send>(
    sender: &mpsc::Sender<T>,
    item: T,
    channel: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExporterError::Cancelled),
        sent = sender.send(item) => {
            sent.map_err(|_| ExporterError::ChannelClosed(channel.to_string()))
        }
    }
}
