//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ExporterConfig;
use super::secret_string;
use crate::domain::errors::ExporterError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`ExporterConfig`]
/// 4. Applies environment variable overrides (`NS_EXPORTER_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`ExporterError::Configuration`] if the file is missing or
/// unreadable, a referenced variable is unset, parsing fails or validation
/// fails.
///
/// # Examples
///
/// ```no_run
/// use ns_exporter::config::loader::load_config;
///
/// let config = load_config("ns-exporter.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ExporterError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ExporterError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from TOML text
///
/// Same pipeline as [`load_config`] minus the file read.
pub fn parse_config(contents: &str) -> Result<ExporterConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ExporterConfig = toml::from_str(&contents)
        .map_err(|e| ExporterError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        ExporterError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ExporterError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ExporterError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the `NS_EXPORTER_*` prefix
///
/// Variables follow the pattern `NS_EXPORTER_<SECTION>_<KEY>`, for example
/// `NS_EXPORTER_INFLUX_TOKEN` or `NS_EXPORTER_QUERY_LIMIT`. Values that fail
/// to parse are ignored. Source sections are only overridden when present in
/// the file.
fn apply_env_overrides(config: &mut ExporterConfig) {
    if let Ok(val) = std::env::var("NS_EXPORTER_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    if let Some(ref mut mongo) = config.mongo {
        if let Ok(val) = std::env::var("NS_EXPORTER_MONGO_URI") {
            mongo.uri = secret_string(val);
        }
        if let Ok(val) = std::env::var("NS_EXPORTER_MONGO_DATABASE") {
            mongo.database = val;
        }
        if let Ok(val) = std::env::var("NS_EXPORTER_MONGO_USER") {
            mongo.user = Some(val);
        }
    }

    if let Some(ref mut nightscout) = config.nightscout {
        if let Ok(val) = std::env::var("NS_EXPORTER_NIGHTSCOUT_BASE_URL") {
            nightscout.base_url = val;
        }
        if let Ok(val) = std::env::var("NS_EXPORTER_NIGHTSCOUT_TOKEN") {
            nightscout.token = secret_string(val);
        }
        if let Ok(val) = std::env::var("NS_EXPORTER_NIGHTSCOUT_USER") {
            nightscout.user = Some(val);
        }
        if let Ok(val) = std::env::var("NS_EXPORTER_NIGHTSCOUT_PAGE_SIZE") {
            if let Ok(size) = val.parse() {
                nightscout.page_size = size;
            }
        }
    }

    if let Ok(val) = std::env::var("NS_EXPORTER_QUERY_LIMIT") {
        if let Ok(limit) = val.parse() {
            config.query.limit = limit;
        }
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_QUERY_SKIP") {
        if let Ok(skip) = val.parse() {
            config.query.skip = skip;
        }
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_QUERY_CHANNEL_CAPACITY") {
        if let Ok(capacity) = val.parse() {
            config.query.channel_capacity = capacity;
        }
    }

    if let Ok(val) = std::env::var("NS_EXPORTER_INFLUX_URL") {
        config.influx.url = val;
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_INFLUX_TOKEN") {
        config.influx.token = secret_string(val);
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_INFLUX_ORG") {
        config.influx.org = val;
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_INFLUX_BUCKET") {
        config.influx.bucket = val;
    }

    if let Ok(val) = std::env::var("NS_EXPORTER_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("NS_EXPORTER_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}
