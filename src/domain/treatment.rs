//! Treatment domain model
//!
//! A treatment is one clinical event logged in Nightscout (carbs, bolus, temp
//! basal, temporary target, site change, ...). There is no discriminant: the
//! transformer classifies records by which fields are present.

use super::decode::{created_at_from_json, null_as_default};
use super::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One clinical event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TreatmentRecord {
    /// Event time; recovered from the raw document, never from the structured decode
    #[serde(skip)]
    pub created_at: DateTime<Utc>,

    /// Free-text event label (`Temp Basal`, `Site Change`, ...)
    #[serde(default, rename = "eventType", deserialize_with = "null_as_default")]
    pub event_type: String,

    #[serde(default, rename = "enteredBy")]
    pub entered_by: Option<String>,

    #[serde(default)]
    pub carbs: Option<f64>,

    #[serde(default)]
    pub insulin: Option<f64>,

    #[serde(default, rename = "isSMB", deserialize_with = "null_as_default")]
    pub is_smb: bool,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub percent: Option<f64>,

    #[serde(default)]
    pub rate: Option<f64>,

    #[serde(default, rename = "targetTop")]
    pub target_top: Option<f64>,

    #[serde(default, rename = "targetBottom")]
    pub target_bottom: Option<f64>,

    #[serde(default)]
    pub units: Option<String>,

    #[serde(default)]
    pub reason: Option<String>,

    /// Caller identity attached by the source
    #[serde(skip)]
    pub user: Option<String>,
}

impl TreatmentRecord {
    /// Create a treatment with only a timestamp and event type
    pub fn new(created_at: DateTime<Utc>, event_type: impl Into<String>) -> Self {
        Self {
            created_at,
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Decode a raw JSON document (Nightscout API)
    pub fn from_json(doc: serde_json::Value) -> Result<Self> {
        let created_at = created_at_from_json(&doc)?;
        let mut record: TreatmentRecord = serde_json::from_value(doc)?;
        record.created_at = created_at;
        Ok(record)
    }

    /// Notes, if present and non-empty
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref().filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_bolus() {
        let doc = json!({
            "created_at": "2024-03-01T10:15:00.000Z",
            "eventType": "Correction Bolus",
            "insulin": 0.4,
            "isSMB": true,
            "enteredBy": "openaps://AndroidAPS"
        });
        let record = TreatmentRecord::from_json(doc).unwrap();

        assert_eq!(record.created_at.to_rfc3339(), "2024-03-01T10:15:00+00:00");
        assert_eq!(record.event_type, "Correction Bolus");
        assert_eq!(record.insulin, Some(0.4));
        assert!(record.is_smb);
        assert_eq!(record.carbs, None);
    }

    #[test]
    fn test_from_json_nulls() {
        let doc = json!({
            "created_at": "2024-03-01T10:15:00Z",
            "eventType": null,
            "isSMB": null,
            "carbs": null,
            "notes": ""
        });
        let record = TreatmentRecord::from_json(doc).unwrap();
        assert_eq!(record.event_type, "");
        assert!(!record.is_smb);
        assert_eq!(record.carbs, None);
        assert_eq!(record.notes(), None);
    }

    #[test]
    fn test_from_json_requires_created_at() {
        let doc = json!({"eventType": "Note", "notes": "hello"});
        assert!(TreatmentRecord::from_json(doc).is_err());
    }
}
