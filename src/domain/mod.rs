//! Domain models and types for the exporter.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Record types** ([`DeviceStatusRecord`], [`TreatmentRecord`]) decoded from Nightscout
//! - **Output points** ([`Point`], [`FieldValue`]) handed to the time-series sink
//! - **Error types** ([`ExporterError`], [`NightscoutError`], [`InfluxError`])
//! - **Result type alias** ([`Result`])
//!
//! # Two-phase decoding
//!
//! Structured decoding of a Nightscout document is lossy: `openaps.suggested.tick`
//! is not carried by the structured form and treatment `created_at` values are
//! legacy strings. Every source therefore decodes in two steps, see [`decode`].
//!
//! ```rust
//! use ns_exporter::domain::DeviceStatusRecord;
//! use serde_json::json;
//!
//! # fn example() -> ns_exporter::domain::Result<()> {
//! let record = DeviceStatusRecord::from_json(json!({
//!     "device": "openaps://rig",
//!     "openaps": {
//!         "iob": {"iob": 1.2, "basaliob": 0.4, "activity": 0.01, "time": "2024-03-01T10:00:00Z"},
//!         "suggested": {"bg": 120, "tick": "+5"}
//!     }
//! }))?;
//! assert_eq!(record.active_suggestion().map(|s| s.tick), Some(5.0));
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod device_status;
pub mod errors;
pub mod point;
pub mod result;
pub mod treatment;

// Re-export commonly used types for convenience
pub use device_status::{DeviceStatusRecord, IobSnapshot, OpenApsStatus, Predictions, Suggestion};
pub use errors::{ExporterError, InfluxError, NightscoutError};
pub use point::{FieldValue, Point};
pub use result::Result;
pub use treatment::TreatmentRecord;
