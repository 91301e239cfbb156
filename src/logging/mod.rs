//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - Console output filtered by `log_level` or `RUST_LOG`
//! - Optional JSON file logging with rotation
//!
//! # Example
//!
//! ```no_run
//! use ns_exporter::logging::init_logging;
//! use ns_exporter::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the completion of one pipeline task
///
/// # Example
///
/// ```no_run
/// use ns_exporter::log_stage_complete;
///
/// log_stage_complete!("source", "mongo", 42);
/// ```
#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr, $name:expr, $count:expr) => {
        tracing::debug!(
            stage = $stage,
            name = %$name,
            count = $count,
            "Stage task finished"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use ns_exporter::log_error_with_context;
/// use ns_exporter::domain::ExporterError;
///
/// let error = ExporterError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
