//! Treatment transformation
//!
//! Treatments carry no discriminant, so each record is classified by which
//! fields are set. Clauses are additive and share the `type` tag, last writer
//! wins. Exactly one point is produced per record; a record matching nothing
//! produces an empty point, which the writer drops.

use crate::domain::{Point, TreatmentRecord};

/// Measurement name of treatment points
pub const MEASUREMENT: &str = "treatments";

const TYPE_TAG: &str = "type";

/// Event types recorded as a `notes` field holding the event type itself
pub const NOTED_EVENTS: [&str; 14] = [
    "Site Change",
    "Insulin Change",
    "Pump Battery Change",
    "Sensor Change",
    "Sensor Start",
    "Sensor Stop",
    "BG Check",
    "Exercise",
    "Announcement",
    "Question",
    "OpenAPS Offline",
    "Alert",
    "Manual BG",
    "Profile Switch",
];

/// Whether `event_type` is in the noted-event allow-list
pub fn is_noted_event(event_type: &str) -> bool {
    NOTED_EVENTS.contains(&event_type)
}

/// Build the point for one treatment
pub fn transform(record: &TreatmentRecord) -> Point {
    let mut point = Point::new(MEASUREMENT, record.created_at);

    if let Some(carbs) = record.carbs.filter(|c| *c > 0.0) {
        point.add_field("carbs", carbs).add_tag(TYPE_TAG, "carbs");
    }

    if let Some(insulin) = record.insulin.filter(|i| *i > 0.0) {
        point
            .add_field("bolus", insulin)
            .add_tag(TYPE_TAG, "bolus")
            .add_tag("smb", record.is_smb.to_string());
    }

    match record.event_type.as_str() {
        "Temp Basal" => {
            point
                .add_field("duration", record.duration.unwrap_or(0.0))
                .add_field("percent", record.percent.unwrap_or(0.0))
                .add_field("rate", record.rate.unwrap_or(0.0))
                .add_tag(TYPE_TAG, "tbs");
        }
        "Temporary Target" => {
            point
                .add_field("duration", record.duration.unwrap_or(0.0))
                .add_field("target_top", record.target_top.unwrap_or(0.0))
                .add_field("target_bottom", record.target_bottom.unwrap_or(0.0))
                .add_tag(TYPE_TAG, "tt");
            if let Some(units) = record.units.as_deref().filter(|u| !u.is_empty()) {
                point.add_field("units", units);
            }
            if let Some(reason) = record.reason.as_deref().filter(|r| !r.is_empty()) {
                point.add_field("reason", reason);
            }
        }
        event_type => {
            if let Some(notes) = record.notes() {
                point.add_field("notes", notes);
            } else if is_noted_event(event_type) {
                point.add_field("notes", event_type);
            }
        }
    }

    point
}
