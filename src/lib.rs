// NS Exporter - Nightscout to InfluxDB ETL Tool
// Copyright (c) 2025 NS Exporter Contributors
// Licensed under the MIT License

//! # NS Exporter - Nightscout to InfluxDB ETL
//!
//! NS Exporter copies OpenAPS device statuses and treatments out of a
//! Nightscout deployment into an InfluxDB v2 bucket for dashboards and
//! retrospective analysis.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Extracting** records from the Nightscout MongoDB database and/or the Nightscout REST API v3
//! - **Transforming** device statuses into `openaps` points and treatments into `treatments` points
//! - **Loading** the points into InfluxDB through the line-protocol write API
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipeline orchestration and transformation
//! - [`adapters`] - External integrations (MongoDB, Nightscout API, InfluxDB)
//! - [`domain`] - Record, point and error types
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ns_exporter::adapters::influx::InfluxWriter;
//! use ns_exporter::adapters::source::{create_sources, QueryWindow};
//! use ns_exporter::config::load_config;
//! use ns_exporter::core::pipeline::Pipeline;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("ns-exporter.toml")?;
//!     let sources = create_sources(&config).await?;
//!     let writer = Arc::new(InfluxWriter::new(&config.influx)?);
//!
//!     let summary = Pipeline::new(sources, writer, CancellationToken::new())
//!         .with_window(QueryWindow::new(config.query.limit, config.query.skip))
//!         .run()
//!         .await;
//!
//!     println!("Wrote {} points", summary.points_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::ExporterError`]:
//!
//! ```rust,no_run
//! use ns_exporter::domain::ExporterError;
//!
//! fn example() -> Result<(), ExporterError> {
//!     let config = ns_exporter::config::load_config("ns-exporter.toml")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!("Starting export");
//! warn!(source = "nightscout", "No device statuses returned");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
