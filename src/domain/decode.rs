//! Two-phase record decoding helpers
//!
//! Upstream documents are decoded in two steps: a serde decode of the
//! structured fields, followed by targeted raw lookups for the fields the
//! structured decode cannot carry (`openaps.suggested.tick`, legacy string
//! encoded `created_at`). The helpers here are shared by every source backend.

use super::{ExporterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Deserialize `null` the same way as a missing key
///
/// Nightscout uploaders write explicit `null` for numbers they did not compute.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw side-channel value of `openaps.suggested.tick`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawTick<'a> {
    /// Decimal string such as `"+5"` or `"-2"`
    Text(&'a str),
    /// Native integer
    Integer(i64),
    /// Absent, null, or any other type
    Missing,
}

impl<'a> RawTick<'a> {
    /// Look up `openaps.suggested.tick` on a raw JSON document
    pub fn from_json(doc: &'a serde_json::Value) -> Self {
        match doc.pointer("/openaps/suggested/tick") {
            Some(serde_json::Value::String(s)) => RawTick::Text(s),
            Some(serde_json::Value::Number(n)) => n.as_i64().map_or(RawTick::Missing, RawTick::Integer),
            _ => RawTick::Missing,
        }
    }

    /// Resolve the tick value, defaulting to 0 when absent or unparseable
    pub fn value(self) -> f64 {
        match self {
            RawTick::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            RawTick::Integer(i) => i as f64,
            RawTick::Missing => 0.0,
        }
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExporterError::Decode(format!("Invalid RFC 3339 timestamp '{value}': {e}")))
}

/// Recover `created_at` from a raw JSON document
pub fn created_at_from_json(doc: &serde_json::Value) -> Result<DateTime<Utc>> {
    match doc.get("created_at") {
        Some(serde_json::Value::String(s)) => parse_rfc3339(s),
        Some(other) => Err(ExporterError::Decode(format!(
            "created_at must be an RFC 3339 string, got {other}"
        ))),
        None => Err(ExporterError::Decode("created_at is missing".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tick_from_signed_string() {
        let doc = json!({"openaps": {"suggested": {"tick": "+5"}}});
        assert_eq!(RawTick::from_json(&doc), RawTick::Text("+5"));
        assert_eq!(RawTick::from_json(&doc).value(), 5.0);

        let doc = json!({"openaps": {"suggested": {"tick": "-3"}}});
        assert_eq!(RawTick::from_json(&doc).value(), -3.0);
    }

    #[test]
    fn test_tick_from_integer() {
        let doc = json!({"openaps": {"suggested": {"tick": 7}}});
        assert_eq!(RawTick::from_json(&doc), RawTick::Integer(7));
        assert_eq!(RawTick::from_json(&doc).value(), 7.0);
    }

    #[test]
    fn test_tick_defaults_to_zero() {
        assert_eq!(RawTick::from_json(&json!({})).value(), 0.0);
        let doc = json!({"openaps": {"suggested": {"tick": "n/a"}}});
        assert_eq!(RawTick::from_json(&doc).value(), 0.0);
        let doc = json!({"openaps": {"suggested": {"tick": true}}});
        assert_eq!(RawTick::from_json(&doc), RawTick::Missing);
    }

    #[test]
    fn test_created_at_from_json() {
        let doc = json!({"created_at": "2024-03-01T10:15:00.000Z"});
        let ts = created_at_from_json(&doc).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:15:00+00:00");

        let doc = json!({"created_at": "2024-03-01T12:15:00+02:00"});
        assert_eq!(created_at_from_json(&doc).unwrap(), ts);
    }

    #[test]
    fn test_created_at_missing_or_invalid() {
        assert!(matches!(
            created_at_from_json(&json!({})),
            Err(ExporterError::Decode(_))
        ));
        assert!(created_at_from_json(&json!({"created_at": "yesterday"})).is_err());
        assert!(created_at_from_json(&json!({"created_at": 1700000000})).is_err());
    }
}
