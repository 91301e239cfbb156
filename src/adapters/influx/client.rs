//! InfluxDB v2 point writer
//!
//! Points are written one at a time as line protocol through the v2 HTTP
//! write API. There is no buffering and no retry: the first failed write
//! fails the run.

use crate::config::InfluxConfig;
use crate::domain::{ExporterError, InfluxError, Point, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Write-one-point capability of the time-series sink
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Write a single non-empty point
    ///
    /// # Errors
    ///
    /// Any failure is fatal for the run.
    async fn write_point(&self, point: &Point) -> Result<()>;
}

/// InfluxDB v2 HTTP writer
pub struct InfluxWriter {
    client: Client,
    write_url: String,
    health_url: String,
    org: String,
    bucket: String,
    auth_header: String,
}

impl InfluxWriter {
    /// Create a writer from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ExporterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let base_url = config.url.trim_end_matches('/');
        Ok(Self {
            client,
            write_url: format!("{base_url}/api/v2/write"),
            health_url: format!("{base_url}/health"),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            auth_header: format!("Token {}", &**config.token.expose_secret()),
        })
    }

    /// Check that the server is up
    ///
    /// # Errors
    ///
    /// Returns [`InfluxError::ConnectionFailed`] if the server is unreachable
    /// or reports itself unhealthy, and [`ExporterError::Cancelled`] if
    /// `cancel` fires first.
    pub async fn health(&self, cancel: &CancellationToken) -> Result<()> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExporterError::Cancelled),
            response = self.client.get(&self.health_url).send() => {
                response.map_err(|e| map_transport_error(&e))?
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExporterError::Cancelled),
                body = response.text() => body.unwrap_or_default(),
            };
            return Err(InfluxError::ConnectionFailed(format!(
                "health check returned {status}: {body}"
            ))
            .into());
        }

        tracing::info!(url = %self.health_url, "InfluxDB is healthy");
        Ok(())
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write_point(&self, point: &Point) -> Result<()> {
        let line = point.to_line_protocol()?;

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ExporterError::Authentication(format!(
                "InfluxDB rejected the token ({status}): {message}"
            )));
        }
        Err(InfluxError::WriteRejected {
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

fn map_transport_error(e: &reqwest::Error) -> InfluxError {
    if e.is_timeout() {
        InfluxError::Timeout(e.to_string())
    } else {
        InfluxError::ConnectionFailed(e.to_string())
    }
}

/// Writer that renders and counts points without sending them
#[derive(Debug, Default)]
pub struct DryRunWriter {
    points: AtomicU64,
}

impl DryRunWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points seen so far
    pub fn count(&self) -> u64 {
        self.points.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PointWriter for DryRunWriter {
    async fn write_point(&self, point: &Point) -> Result<()> {
        let line = point.to_line_protocol()?;
        self.points.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(line = %line, "Dry run: skipping write");
        Ok(())
    }
}
