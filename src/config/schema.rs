//! Configuration schema types
//!
//! This module defines the configuration structure that maps to the TOML file.

use crate::config::SecretString;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

/// Main exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Local-database source (Nightscout MongoDB)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo: Option<MongoConfig>,

    /// Remote-API source (Nightscout REST API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nightscout: Option<NightscoutConfig>,

    /// Row window and pipeline sizing
    #[serde(default)]
    pub query: QueryConfig,

    /// Time-series sink
    pub influx: InfluxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExporterConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;

        if self.mongo.is_none() && self.nightscout.is_none() {
            return Err(
                "at least one source must be configured: [mongo] and/or [nightscout]".to_string(),
            );
        }
        if let Some(ref mongo) = self.mongo {
            mongo.validate()?;
        }
        if let Some(ref nightscout) = self.nightscout {
            nightscout.validate()?;
        }

        self.query.validate()?;
        self.influx.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Number of configured sources
    pub fn source_count(&self) -> usize {
        usize::from(self.mongo.is_some()) + usize::from(self.nightscout.is_some())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (transform everything, write nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Nightscout MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string; may embed credentials so it is kept secret
    pub uri: SecretString,

    /// Database name
    pub database: String,

    /// Identity attached to every record read from this source
    #[serde(default)]
    pub user: Option<String>,
}

impl MongoConfig {
    fn validate(&self) -> Result<(), String> {
        let uri = self.uri.expose_secret();
        if uri.is_empty() {
            return Err("mongo.uri cannot be empty".to_string());
        }
        if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
            return Err("mongo.uri must start with mongodb:// or mongodb+srv://".to_string());
        }
        if self.database.is_empty() {
            return Err("mongo.database cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Nightscout REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightscoutConfig {
    /// Base URL of the Nightscout site
    pub base_url: String,

    /// Access token, exchanged for a JWT on authorization
    pub token: SecretString,

    /// Identity attached to every record read from this source
    #[serde(default)]
    pub user: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Page size used when the row limit is unbounded
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl NightscoutConfig {
    fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("nightscout.base_url cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("nightscout.base_url must start with http:// or https://".to_string());
        }
        if self.token.expose_secret().is_empty() {
            return Err("nightscout.token cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("nightscout.timeout_seconds must be > 0".to_string());
        }
        if !(1..=10_000).contains(&self.page_size) {
            return Err(format!(
                "nightscout.page_size must be between 1 and 10000, got {}",
                self.page_size
            ));
        }
        Ok(())
    }
}

/// Row window and pipeline sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum rows per stream; `<= 0` is unbounded
    #[serde(default)]
    pub limit: i64,

    /// Rows to skip per stream; `<= 0` is no offset
    #[serde(default)]
    pub skip: i64,

    /// Capacity of each pipeline channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl QueryConfig {
    fn validate(&self) -> Result<(), String> {
        if !(1..=65_536).contains(&self.channel_capacity) {
            return Err(format!(
                "query.channel_capacity must be between 1 and 65536, got {}",
                self.channel_capacity
            ));
        }
        Ok(())
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            skip: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// InfluxDB v2 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// InfluxDB base URL
    pub url: String,

    /// API token
    pub token: SecretString,

    /// Organization
    #[serde(default = "default_influx_org")]
    pub org: String,

    /// Bucket
    #[serde(default = "default_influx_bucket")]
    pub bucket: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl InfluxConfig {
    fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("influx.url cannot be empty".to_string());
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("influx.url must start with http:// or https://".to_string());
        }
        if self.token.expose_secret().is_empty() {
            return Err("influx.token cannot be empty".to_string());
        }
        if self.org.is_empty() {
            return Err("influx.org cannot be empty".to_string());
        }
        if self.bucket.is_empty() {
            return Err("influx.bucket cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("influx.timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local JSON file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_page_size() -> usize {
    1000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_influx_org() -> String {
    "ns".to_string()
}

fn default_influx_bucket() -> String {
    "ns".to_string()
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn valid_config() -> ExporterConfig {
        ExporterConfig {
            application: ApplicationConfig::default(),
            mongo: Some(MongoConfig {
                uri: secret_string("mongodb://localhost:27017".to_string()),
                database: "nightscout".to_string(),
                user: None,
            }),
            nightscout: None,
            query: QueryConfig::default(),
            influx: InfluxConfig {
                url: "http://localhost:8086".to_string(),
                token: secret_string("influx-token".to_string()),
                org: default_influx_org(),
                bucket: default_influx_bucket(),
                timeout_seconds: 30,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
        assert_eq!(valid_config().source_count(), 1);
    }

    #[test]
    fn test_requires_a_source() {
        let mut config = valid_config();
        config.mongo = None;
        let err = config.validate().unwrap_err();
        assert!(err.contains("at least one source"));
    }

    #[test]
    fn test_both_sources() {
        let mut config = valid_config();
        config.nightscout = Some(NightscoutConfig {
            base_url: "https://ns.example.com".to_string(),
            token: secret_string("reader-abc".to_string()),
            user: Some("alice".to_string()),
            timeout_seconds: 30,
            page_size: 500,
        });
        assert!(config.validate().is_ok());
        assert_eq!(config.source_count(), 2);
    }

    #[test]
    fn test_invalid_mongo_uri() {
        let mut config = valid_config();
        config.mongo.as_mut().unwrap().uri = secret_string("localhost:27017".to_string());
        assert!(config.validate().unwrap_err().contains("mongo.uri"));
    }

    #[test]
    fn test_invalid_influx_url() {
        let mut config = valid_config();
        config.influx.url = "localhost:8086".to_string();
        assert!(config.validate().unwrap_err().contains("influx.url"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid_config();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("log_level"));
    }

    #[test]
    fn test_invalid_channel_capacity() {
        let mut config = valid_config();
        config.query.channel_capacity = 0;
        assert!(config.validate().unwrap_err().contains("channel_capacity"));
    }

    #[test]
    fn test_invalid_rotation() {
        let mut config = valid_config();
        config.logging.local_rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }
}
