//! InfluxDB v2 sink

pub mod client;

pub use client::{DryRunWriter, InfluxWriter, PointWriter};
