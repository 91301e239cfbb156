//! Nightscout REST API source
//!
//! Authorizes with API v2 and reads the `devicestatus` and `treatments`
//! collections through API v3, newest first.

use super::models::{is_openaps_entry, AuthorizationResponse, Envelope};
use crate::adapters::source::{forward, QueryWindow, RecordSource};
use crate::config::{secret_string, NightscoutConfig, SecretString};
use crate::domain::{
    DeviceStatusRecord, ExporterError, NightscoutError, Result, TreatmentRecord,
};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Remote-API source
pub struct NightscoutSource {
    base_url: String,
    client: Client,
    token: SecretString,
    jwt: Option<SecretString>,
    user: Option<String>,
    page_size: usize,
}

impl NightscoutSource {
    /// Create an unauthorized source
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: &NightscoutConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ExporterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            token: config.token.clone(),
            jwt: None,
            user: config.user.clone(),
            page_size: config.page_size.max(1),
        })
    }

    /// Whether a JWT was obtained
    pub fn is_authorized(&self) -> bool {
        self.jwt.is_some()
    }

    /// Attach credentials: bearer JWT when authorized, `token` query parameter otherwise
    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        match self.jwt {
            Some(ref jwt) => request.bearer_auth(&**jwt.expose_secret()),
            None => request.query(&[("token", &**self.token.expose_secret())]),
        }
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExporterError::Cancelled),
            response = request.send() => {
                response.map_err(|e| ExporterError::from(map_transport_error(&e)))
            }
        }
    }

    /// Fetch one page of a v3 collection
    async fn fetch_page(
        &self,
        collection: &str,
        skip: u64,
        limit: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/api/v3/{collection}", self.base_url);
        let request = self.authenticate(self.client.get(&url).query(&[
            ("sort$desc", "created_at".to_string()),
            ("skip", skip.to_string()),
            ("limit", limit.to_string()),
        ]));

        tracing::debug!(collection, skip, limit, "Fetching Nightscout page");
        let response = error_for_status(self.send(request, cancel).await?).await?;

        let envelope: Envelope = read_json(response, cancel, |e| {
            NightscoutError::InvalidResponse(format!("{collection} response: {e}"))
        })
        .await?;

        Ok(envelope.result)
    }

    /// Page through a collection, decoding and forwarding each kept entry
    ///
    /// A bounded window is read in pages of at most `page_size` until the
    /// limit is reached. An unbounded window stops at the first short page.
    async fn load<T, D>(
        &self,
        collection: &str,
        window: QueryWindow,
        sender: &mpsc::Sender<T>,
        cancel: &CancellationToken,
        decode: D,
    ) -> Result<u64>
    where
        T: Send,
        D: Fn(Value) -> Result<Option<T>> + Send + Sync,
    {
        let mut skip = window.skip().unwrap_or(0);
        let mut remaining = window.limit();
        let page_size = self.page_size as u64;
        let mut sent = 0u64;

        loop {
            let limit = remaining.map_or(page_size, |r| r.min(page_size));
            if limit == 0 {
                break;
            }

            let page = self.fetch_page(collection, skip, limit, cancel).await?;
            let fetched = page.len() as u64;

            for entry in page {
                if let Some(record) = decode(entry)? {
                    forward(sender, record, collection, cancel).await?;
                    sent += 1;
                }
            }

            skip += fetched;
            remaining = remaining.map(|r| r.saturating_sub(fetched));
            if fetched < limit {
                break;
            }
        }

        Ok(sent)
    }
}

#[async_trait]
impl RecordSource for NightscoutSource {
    fn name(&self) -> &str {
        "nightscout"
    }

    async fn authorize(&mut self, cancel: &CancellationToken) -> Result<()> {
        let url = format!(
            "{}/api/v2/authorization/request/{}",
            self.base_url,
            &**self.token.expose_secret()
        );

        let response = error_for_status(self.send(self.client.get(&url), cancel).await?).await?;

        let authorization: AuthorizationResponse = read_json(response, cancel, |e| {
            NightscoutError::AuthenticationFailed(format!("Invalid authorization response: {e}"))
        })
        .await?;

        tracing::info!(
            base_url = %self.base_url,
            expires = ?authorization.exp,
            "Authorized with Nightscout"
        );
        self.jwt = Some(secret_string(authorization.token));
        Ok(())
    }

    async fn load_device_statuses(
        &self,
        sender: &mpsc::Sender<DeviceStatusRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.load("devicestatus", window, sender, cancel, |entry| {
            if !is_openaps_entry(&entry) {
                return Ok(None);
            }
            let mut record = DeviceStatusRecord::from_json(entry)?;
            record.user = self.user.clone();
            Ok(Some(record))
        })
        .await
    }

    async fn load_treatments(
        &self,
        sender: &mpsc::Sender<TreatmentRecord>,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.load("treatments", window, sender, cancel, |entry| {
            let mut record = TreatmentRecord::from_json(entry)?;
            record.user = self.user.clone();
            Ok(Some(record))
        })
        .await
    }
}

fn map_transport_error(e: &reqwest::Error) -> NightscoutError {
    if e.is_timeout() {
        NightscoutError::Timeout(e.to_string())
    } else {
        NightscoutError::ConnectionFailed(e.to_string())
    }
}

/// Decode a JSON body, giving up as soon as `cancel` fires
async fn read_json<T, F>(response: Response, cancel: &CancellationToken, invalid: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(reqwest::Error) -> NightscoutError,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExporterError::Cancelled),
        body = response.json::<T>() => body.map_err(|e| ExporterError::from(invalid(e))),
    }
}

/// Turn non-success statuses into typed errors
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    let error = if status.is_server_error() {
        NightscoutError::ServerError {
            status: status.as_u16(),
            message,
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        NightscoutError::AuthenticationFailed(format!("{status}: {message}"))
    } else {
        NightscoutError::ClientError {
            status: status.as_u16(),
            message,
        }
    };
    Err(error.into())
}
