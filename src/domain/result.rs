//! Result type alias for the exporter

use super::errors::ExporterError;

/// Result type alias using `ExporterError` as the error type
///
/// # Examples
///
/// ```
/// use ns_exporter::domain::result::Result;
/// use ns_exporter::domain::errors::ExporterError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ExporterError::Decode("missing created_at".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ExporterError>;
