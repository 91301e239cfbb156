//! Configuration management for the exporter.
//!
//! TOML configuration with:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `NS_EXPORTER_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [mongo]
//! uri = "${NS_MONGO_URI}"
//! database = "nightscout"
//!
//! [nightscout]
//! base_url = "https://ns.example.com"
//! token = "${NS_API_TOKEN}"
//! user = "alice"
//!
//! [query]
//! limit = 1000
//!
//! [influx]
//! url = "http://localhost:8086"
//! token = "${INFLUX_TOKEN}"
//! org = "ns"
//! bucket = "ns"
//! ```
//!
//! At least one of `[mongo]` and `[nightscout]` must be present. When both are,
//! both sources are read in the same run.
//!
//! ```rust,no_run
//! use ns_exporter::config::load_config;
//!
//! # fn example() {
//! match load_config("ns-exporter.toml") {
//!     Ok(config) => println!("{} source(s) configured", config.source_count()),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, ExporterConfig, InfluxConfig, LoggingConfig, MongoConfig,
    NightscoutConfig, QueryConfig,
};
pub use secret::{redact_uri, secret_string, SecretString, SecretValue};
