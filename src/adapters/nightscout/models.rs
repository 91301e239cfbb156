//! Nightscout API payloads

use serde::Deserialize;
use serde_json::Value;

/// Response of `GET /api/v2/authorization/request/{token}`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationResponse {
    /// Signed JWT for subsequent requests
    pub token: String,

    /// Expiry as a UNIX timestamp, when provided
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Envelope of every API v3 collection response
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result: Vec<Value>,
}

/// Whether a raw device-status entry was uploaded by an OpenAPS-family device
pub fn is_openaps_entry(entry: &Value) -> bool {
    entry
        .get("device")
        .and_then(Value::as_str)
        .is_some_and(|device| device.starts_with("openaps"))
}
