//! Record to point transformation
//!
//! - [`device_status`]: stateful, deduplicates repeated suggestions
//! - [`treatment`]: stateless classification, one point per record

pub mod device_status;
pub mod treatment;

pub use device_status::{DeviceStatusTransformer, ReasonParser};
pub use treatment::{is_noted_event, NOTED_EVENTS};
