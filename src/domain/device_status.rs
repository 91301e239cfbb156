//! Device-status domain model
//!
//! A device-status record is one OpenAPS telemetry snapshot uploaded to
//! Nightscout: the insulin-on-board state, and optionally the loop's dosing
//! suggestion with its prediction curves.

use super::decode::{null_as_default, RawTick};
use super::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OpenAPS telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    /// Uploading device identifier (e.g. `openaps://phone`)
    #[serde(default, deserialize_with = "null_as_default")]
    pub device: String,

    /// OpenAPS payload
    pub openaps: OpenApsStatus,

    /// Caller identity attached by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// The `openaps` payload of a device-status document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApsStatus {
    /// Insulin-on-board snapshot, always present
    pub iob: IobSnapshot,

    /// Dosing suggestion, present only when the loop produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested: Option<Suggestion>,
}

/// Insulin-on-board snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IobSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub iob: f64,

    #[serde(default, rename = "basaliob", deserialize_with = "null_as_default")]
    pub basal_iob: f64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub activity: f64,

    /// Snapshot time, used as the point timestamp
    pub time: DateTime<Utc>,
}

/// Dosing suggestion computed by the loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Blood glucose the suggestion was computed for; `<= 0` means no data
    #[serde(default, deserialize_with = "null_as_default")]
    pub bg: f64,

    /// BG delta since the previous reading; recovered from the raw document
    #[serde(skip)]
    pub tick: f64,

    #[serde(default, rename = "eventualBG", deserialize_with = "null_as_default")]
    pub eventual_bg: f64,

    #[serde(default, rename = "targetBG", deserialize_with = "null_as_default")]
    pub target_bg: f64,

    #[serde(default, rename = "insulinReq", deserialize_with = "null_as_default")]
    pub insulin_req: f64,

    #[serde(default, rename = "COB", deserialize_with = "null_as_default")]
    pub cob: f64,

    /// Suggested bolus
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: f64,

    /// Suggested temp basal rate
    #[serde(default, deserialize_with = "null_as_default")]
    pub rate: f64,

    /// Suggested temp basal duration in minutes
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,

    /// Free-text explanation, carries `Dev`, `ISF` and `CR`
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,

    #[serde(default, rename = "predBGs", deserialize_with = "null_as_default")]
    pub predictions: Predictions,
}

/// BG prediction curves, oldest horizon first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    #[serde(default, rename = "IOB", deserialize_with = "null_as_default")]
    pub iob: Vec<f64>,

    #[serde(default, rename = "ZT", deserialize_with = "null_as_default")]
    pub zt: Vec<f64>,

    #[serde(default, rename = "COB", deserialize_with = "null_as_default")]
    pub cob: Vec<f64>,

    #[serde(default, rename = "UAM", deserialize_with = "null_as_default")]
    pub uam: Vec<f64>,
}

impl Predictions {
    /// Furthest-horizon prediction of each non-empty curve, keyed by curve name
    pub fn last_values(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [
            ("iob", &self.iob),
            ("zt", &self.zt),
            ("cob", &self.cob),
            ("uam", &self.uam),
        ]
        .into_iter()
        .filter_map(|(name, curve)| curve.last().map(|v| (name, *v)))
    }
}

impl DeviceStatusRecord {
    /// Create a record with only an IOB snapshot
    pub fn new(iob: IobSnapshot) -> Self {
        Self {
            device: String::new(),
            openaps: OpenApsStatus {
                iob,
                suggested: None,
            },
            user: None,
        }
    }

    /// Attach a suggestion
    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.openaps.suggested = Some(suggestion);
        self
    }

    /// The suggestion, if the loop produced usable suggestion data (`bg > 0`)
    pub fn active_suggestion(&self) -> Option<&Suggestion> {
        self.openaps.suggested.as_ref().filter(|s| s.bg > 0.0)
    }

    /// Store the side-channel tick on the suggestion, if there is one
    pub fn set_tick(&mut self, tick: f64) {
        if let Some(suggested) = self.openaps.suggested.as_mut() {
            suggested.tick = tick;
        }
    }

    /// Decode a raw JSON document (Nightscout API)
    pub fn from_json(doc: serde_json::Value) -> Result<Self> {
        let tick = RawTick::from_json(&doc).value();
        let mut record: DeviceStatusRecord = serde_json::from_value(doc)?;
        record.set_tick(tick);
        Ok(record)
    }
}

impl IobSnapshot {
    /// Create an IOB snapshot
    pub fn new(iob: f64, basal_iob: f64, activity: f64, time: DateTime<Utc>) -> Self {
        Self {
            iob,
            basal_iob,
            activity,
            time,
        }
    }
}
