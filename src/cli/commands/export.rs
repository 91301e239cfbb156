//! Export command implementation
//!
//! This module implements the `export` command: one pipeline run from every
//! configured source into InfluxDB.

use crate::adapters::influx::{DryRunWriter, InfluxWriter, PointWriter};
use crate::adapters::source::{create_sources, QueryWindow};
use crate::config::load_config;
use crate::core::pipeline::{Pipeline, PipelineSummary};
use crate::domain::ExporterError;
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exit code for a completed run
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for configuration errors
pub const EXIT_CONFIGURATION: i32 = 2;
/// Exit code for connection and authentication errors
pub const EXIT_CONNECTION: i32 = 4;
/// Exit code for any other failure
pub const EXIT_FATAL: i32 = 5;
/// Exit code after SIGINT/SIGTERM
pub const EXIT_INTERRUPTED: i32 = 130;

/// Arguments for the export command
#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// Maximum records per stream (overrides query.limit; <= 0 is unbounded)
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Records to skip per stream (overrides query.skip)
    #[arg(long, allow_negative_numbers = true)]
    pub skip: Option<i64>,

    /// Dry run mode - transform everything without writing to InfluxDB
    #[arg(long)]
    pub dry_run: bool,
}

/// Map an error to the process exit code
pub fn exit_code_for(error: &ExporterError) -> i32 {
    match error {
        ExporterError::Configuration(_) => EXIT_CONFIGURATION,
        ExporterError::Cancelled => EXIT_INTERRUPTED,
        e if e.is_connection() => EXIT_CONNECTION,
        _ => EXIT_FATAL,
    }
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(&self, config_path: &str, cancel: CancellationToken) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        if let Some(limit) = self.limit {
            tracing::info!(limit, "Overriding query limit from CLI");
            config.query.limit = limit;
        }
        if let Some(skip) = self.skip {
            tracing::info!(skip, "Overriding query skip from CLI");
            config.query.skip = skip;
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(EXIT_CONFIGURATION);
        }

        let writer: Arc<dyn PointWriter> = if config.application.dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            println!("🔍 DRY RUN MODE - No data will be written to InfluxDB");
            println!();
            Arc::new(DryRunWriter::new())
        } else {
            let influx = match InfluxWriter::new(&config.influx) {
                Ok(w) => w,
                Err(e) => return Ok(report_failure("Failed to create InfluxDB writer", &e)),
            };
            if let Err(e) = influx.health(&cancel).await {
                return Ok(report_failure("InfluxDB is not reachable", &e));
            }
            Arc::new(influx)
        };

        let sources = match create_sources(&config).await {
            Ok(s) => s,
            Err(e) => return Ok(report_failure("Failed to initialize sources", &e)),
        };

        println!("🚀 Starting export...");
        println!();

        let summary = Pipeline::new(sources, writer, cancel.clone())
            .with_window(QueryWindow::new(config.query.limit, config.query.skip))
            .with_channel_capacity(config.query.channel_capacity)
            .run()
            .await;
        summary.log();
        print_summary(&summary);

        let exit_code = match summary.error {
            None => {
                println!("✅ Export completed successfully!");
                EXIT_SUCCESS
            }
            Some(_) if cancel.is_cancelled() => {
                println!("⚠️  Export interrupted.");
                tracing::info!("Export interrupted by user signal");
                EXIT_INTERRUPTED
            }
            Some(ref e) => {
                eprintln!("Export failed: {e}");
                exit_code_for(e)
            }
        };

        Ok(exit_code)
    }
}

fn report_failure(context: &str, error: &ExporterError) -> i32 {
    crate::log_error_with_context!(error, context);
    eprintln!("{context}: {error}");
    exit_code_for(error)
}

fn print_summary(summary: &PipelineSummary) {
    println!();
    println!("📊 Export Summary:");
    println!("  Device Statuses Read: {}", summary.device_statuses_sent);
    println!("  Treatments Read: {}", summary.treatments_sent);
    println!("  Duplicates Skipped: {}", summary.duplicates_skipped);
    println!("  Points Emitted: {}", summary.points_emitted);
    println!("  Empty Points Skipped: {}", summary.empty_points_skipped);
    println!("  Points Written: {}", summary.points_written);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!("  State: {}", summary.state);
    println!();
}
