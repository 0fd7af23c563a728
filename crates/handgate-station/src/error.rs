//! Error types for the access station

use thiserror::Error;

/// Result type alias for station operations
pub type Result<T> = std::result::Result<T, StationError>;

/// Errors that can occur at the station
///
/// A denied attempt is not an error: it is an audited outcome. These are
/// failures of input, configuration, storage or hardware.
#[derive(Debug, Error)]
pub enum StationError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] handgate_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Camera or landmark model could not deliver frames
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// Arduino not connected or port busy
    #[error("Serial link unavailable: {0}")]
    SerialUnavailable(String),

    /// Student not registered
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    /// Area not registered
    #[error("Area not found: {0}")]
    AreaNotFound(String),

    /// RFID card not registered
    #[error("RFID credential not found: {0}")]
    RfidNotFound(String),

    /// Record already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Enrollment capture ended without a full sequence
    #[error("Enrollment incomplete: {0}")]
    EnrollmentIncomplete(String),
}

impl From<serde_json::Error> for StationError {
    fn from(e: serde_json::Error) -> Self {
        StationError::Serialization(e.to_string())
    }
}

impl From<serialport::Error> for StationError {
    fn from(e: serialport::Error) -> Self {
        StationError::SerialUnavailable(e.to_string())
    }
}
