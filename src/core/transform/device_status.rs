//! Device-status transformation
//!
//! Turns OpenAPS device-status records into `openaps` points. Suggestion data
//! repeated by the uploader is suppressed by remembering the last `(bg, tick)`
//! pair seen on the stream, so records must arrive newest first from a single
//! producer for deduplication to be exact.

use crate::domain::{DeviceStatusRecord, ExporterError, Point, Result, Suggestion};
use regex::Regex;

/// Measurement name of device-status points
pub const MEASUREMENT: &str = "openaps";

const REASON_PATTERN: &str =
    r"Dev: (?P<dev>[-0-9.]+),.*ISF: (?P<isf>[-0-9.]+),.*CR: (?P<cr>[-0-9.]+)";

/// Extracts deviation, sensitivity and carb ratio from a suggestion's reason text
#[derive(Debug, Clone)]
pub struct ReasonParser {
    regex: Regex,
}

impl ReasonParser {
    /// Compile the reason pattern
    pub fn new() -> Result<Self> {
        let regex = Regex::new(REASON_PATTERN)
            .map_err(|e| ExporterError::Other(format!("Invalid reason pattern: {e}")))?;
        Ok(Self { regex })
    }

    /// Named numeric values found in `reason`
    ///
    /// Captures that do not parse as decimals are omitted.
    pub fn parse(&self, reason: &str) -> Vec<(&'static str, f64)> {
        let Some(captures) = self.regex.captures(reason) else {
            return Vec::new();
        };

        ["dev", "isf", "cr"]
            .into_iter()
            .filter_map(|name| {
                let value = captures.name(name)?.as_str().parse::<f64>().ok()?;
                Some((name, value))
            })
            .collect()
    }
}

/// Stateful device-status transformer
///
/// Create one per run; dedup state never outlives it.
#[derive(Debug)]
pub struct DeviceStatusTransformer {
    reason: ReasonParser,
    last_bg: f64,
    last_tick: f64,
    duplicates: u64,
}

impl DeviceStatusTransformer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reason: ReasonParser::new()?,
            last_bg: 0.0,
            last_tick: 0.0,
            duplicates: 0,
        })
    }

    /// Records dropped as duplicates so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Transform one record
    ///
    /// Returns `None` when the record repeats the previous record's non-zero
    /// `(bg, tick)` pair; no point is emitted for it.
    pub fn transform(&mut self, record: &DeviceStatusRecord) -> Option<Point> {
        let iob = &record.openaps.iob;
        let mut point = Point::new(MEASUREMENT, iob.time);
        point
            .add_field("iob", iob.iob)
            .add_field("basal_iob", iob.basal_iob)
            .add_field("activity", iob.activity);

        let Some(suggested) = record.active_suggestion() else {
            return Some(point);
        };

        if self.is_duplicate(suggested) {
            self.duplicates += 1;
            tracing::debug!(
                time = %iob.time,
                bg = suggested.bg,
                tick = suggested.tick,
                "Skipping duplicate suggestion"
            );
            return None;
        }
        self.last_bg = suggested.bg;
        self.last_tick = suggested.tick;

        point
            .add_field("bg", suggested.bg)
            .add_field("tick", suggested.tick)
            .add_field("eventual_bg", suggested.eventual_bg)
            .add_field("target_bg", suggested.target_bg)
            .add_field("insulin_req", suggested.insulin_req)
            .add_field("cob", suggested.cob)
            .add_field("bolus", suggested.units)
            .add_field("tbs_rate", suggested.rate)
            .add_field("tbs_duration", suggested.duration);

        for (curve, value) in suggested.predictions.last_values() {
            point.add_field(format!("pred_{curve}"), value);
        }

        if !suggested.reason.is_empty() {
            for (name, value) in self.reason.parse(&suggested.reason) {
                point.add_field(name, value);
            }
        }

        Some(point)
    }

    fn is_duplicate(&self, suggested: &Suggestion) -> bool {
        suggested.tick != 0.0 && suggested.bg == self.last_bg && suggested.tick == self.last_tick
    }
}
