//! Extract-transform-load pipeline
//!
//! ```text
//! sources ──► device-status channel ──► device-status transformer ──┐
//!         └─► treatment channel ─────► treatment transformer ───────┴─► point channel ──► writer
//! ```
//!
//! - [`driver`] - [`Pipeline`] and its state machine
//! - [`stages`] - Stage start calls and their join handles
//! - [`summary`] - Per-stage counters

pub mod driver;
pub mod stages;
pub mod summary;

pub use driver::{Pipeline, PipelineState, DEFAULT_CHANNEL_CAPACITY};
pub use stages::{start_sources, start_transformers, start_writer, StreamKind};
pub use summary::PipelineSummary;
