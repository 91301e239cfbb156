//! External system integrations.
//!
//! - [`source`] - Record source abstraction ([`source::RecordSource`], [`source::DataSource`])
//! - [`mongo`] - Nightscout MongoDB backend
//! - [`nightscout`] - Nightscout REST API backend
//! - [`influx`] - InfluxDB v2 sink
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the pipeline can be
//! driven by in-memory implementations in tests.
//!
//! ```rust,no_run
//! use ns_exporter::adapters::mongo::{MemoryStore, MongoSource};
//! use ns_exporter::adapters::source::DataSource;
//!
//! let store = MemoryStore::new();
//! let source: DataSource = MongoSource::new(Box::new(store), Some("alice".to_string())).into();
//! ```

pub mod influx;
pub mod mongo;
pub mod nightscout;
pub mod source;
