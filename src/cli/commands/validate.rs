//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the exporter configuration file.

use super::export::{EXIT_CONFIGURATION, EXIT_SUCCESS};
use crate::config::{load_config, ExporterConfig};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Loading already validates, so a loaded configuration is a valid one.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        match load_config(config_path) {
            Ok(config) => {
                println!("✅ Configuration is valid");
                println!();
                print_config(&config);
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(EXIT_CONFIGURATION)
            }
        }
    }
}

fn print_config(config: &ExporterConfig) {
    println!("Configuration Summary:");
    println!("  Log Level: {}", config.application.log_level);
    println!("  Dry Run: {}", config.application.dry_run);
    if let Some(ref mongo) = config.mongo {
        println!("  MongoDB Database: {}", mongo.database);
        println!("  MongoDB User Tag: {}", mongo.user.as_deref().unwrap_or("-"));
    }
    if let Some(ref nightscout) = config.nightscout {
        println!("  Nightscout URL: {}", nightscout.base_url);
        println!("  Nightscout User Tag: {}", nightscout.user.as_deref().unwrap_or("-"));
        println!("  Nightscout Page Size: {}", nightscout.page_size);
    }
    println!("  Query Limit: {}", config.query.limit);
    println!("  Query Skip: {}", config.query.skip);
    println!("  Channel Capacity: {}", config.query.channel_capacity);
    println!("  InfluxDB URL: {}", config.influx.url);
    println!("  InfluxDB Org/Bucket: {}/{}", config.influx.org, config.influx.bucket);
    println!();
}
