//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for NS Exporter using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// NS Exporter - Nightscout to InfluxDB ETL Tool
#[derive(Parser, Debug)]
#[command(name = "ns-exporter")]
#[command(version, about, long_about = None)]
#[command(author = "NS Exporter Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ns-exporter.toml", env = "NS_EXPORTER_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "NS_EXPORTER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export device statuses and treatments to InfluxDB
    Export(commands::export::ExportArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}
