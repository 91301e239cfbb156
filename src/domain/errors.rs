//! Domain error types
//!
//! This module defines the error hierarchy for the exporter. Every error is fatal
//! for the run: there is no local recovery tier, the operator reruns with an
//! adjusted `skip` instead. Third-party error types are flattened into strings
//! so they never leak through the public API.

use thiserror::Error;

/// Main exporter error type
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Nightscout REST API errors
    #[error("Nightscout error: {0}")]
    Nightscout(#[from] NightscoutError),

    /// InfluxDB errors
    #[error("InfluxDB error: {0}")]
    Influx(#[from] InfluxError),

    /// Local database (MongoDB) errors
    #[error("Database error: {0}")]
    Database(String),

    /// Backend unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A record could not be decoded into its structured form
    #[error("Decode error: {0}")]
    Decode(String),

    /// The run was cancelled while blocked on I/O
    #[error("Operation cancelled")]
    Cancelled,

    /// A pipeline channel was closed while a stage still needed it
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Pipeline orchestration errors (task panics, join failures)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl ExporterError {
    /// Whether this error is a consequence of another failure rather than its cause
    ///
    /// Cancellation and closed channels are what the remaining stages observe
    /// once the run is torn down, so the driver prefers any other error when
    /// reporting why a run failed.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ChannelClosed(_))
    }

    /// Whether this error comes from reaching or authenticating against a backend
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Authentication(_) => true,
            Self::Nightscout(e) => matches!(
                e,
                NightscoutError::ConnectionFailed(_)
                    | NightscoutError::AuthenticationFailed(_)
                    | NightscoutError::Timeout(_)
            ),
            Self::Influx(e) => matches!(e, InfluxError::ConnectionFailed(_) | InfluxError::Timeout(_)),
            _ => false,
        }
    }
}

/// Nightscout-specific errors
///
/// Errors that occur when talking to the Nightscout REST API.
#[derive(Debug, Error)]
pub enum NightscoutError {
    /// Failed to connect to the Nightscout server
    #[error("Failed to connect to Nightscout: {0}")]
    ConnectionFailed(String),

    /// Token exchange failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response body could not be decoded
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

/// InfluxDB-specific errors
#[derive(Debug, Error)]
pub enum InfluxError {
    /// Failed to connect to InfluxDB
    #[error("Failed to connect to InfluxDB: {0}")]
    ConnectionFailed(String),

    /// The server rejected a point
    #[error("Write rejected: {status} - {message}")]
    WriteRejected { status: u16, message: String },

    /// The point cannot be encoded as line protocol
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Decode(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ExporterError {
    fn from(err: toml::de::Error) -> Self {
        ExporterError::Configuration(format!("TOML parse error: {err}"))
    }
}

// Unreachable servers are connection failures, everything else is a database error
impl From<mongodb::error::Error> for ExporterError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match *err.kind {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
                ExporterError::Connection(err.to_string())
            }
            _ => ExporterError::Database(err.to_string()),
        }
    }
}

impl From<mongodb::bson::de::Error> for ExporterError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        ExporterError::Decode(err.to_string())
    }
}
