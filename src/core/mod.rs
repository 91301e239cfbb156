//! Core business logic.
//!
//! # Modules
//!
//! - [`transform`] - Record to point transformation
//! - [`pipeline`] - Concurrent pipeline orchestration
//!
//! # Workflow
//!
//! 1. **Authorize**: Remote sources exchange their token for a JWT
//! 2. **Extract**: Each source streams device statuses and treatments, newest first
//! 3. **Transform**: Records become points; repeated suggestions are dropped
//! 4. **Load**: Non-empty points are written to InfluxDB one by one
//! 5. **Report**: Per-stage counters are logged
//!
//! # Example
//!
//! ```rust,no_run
//! use ns_exporter::adapters::influx::InfluxWriter;
//! use ns_exporter::adapters::source::{create_sources, QueryWindow};
//! use ns_exporter::config::load_config;
//! use ns_exporter::core::pipeline::Pipeline;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ns-exporter.toml")?;
//! let sources = create_sources(&config).await?;
//! let writer = Arc::new(InfluxWriter::new(&config.influx)?);
//!
//! let summary = Pipeline::new(sources, writer, CancellationToken::new())
//!     .with_window(QueryWindow::new(config.query.limit, config.query.skip))
//!     .run()
//!     .await
//!     .into_result()?;
//!
//! println!("Written: {}", summary.points_written);
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod transform;
