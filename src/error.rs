//! Custom error types for the application.
//!
//! This module defines the primary error type, `SpectroError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures the instrument
//! stack can produce.
//!
//! ## Error Hierarchy
//!
//! - **`Hardware`**: The device is unreachable or rejected a command. Fatal to
//!   the in-flight operation, never to the process.
//! - **`NotConnected`**: A command was issued against a session whose device
//!   handle has not been opened yet.
//! - **`InvalidArgument`**: An out-of-range or malformed parameter. Raised at
//!   the call boundary, before any hardware command is sent.
//! - **`AcquisitionTimeout`**: The detector did not deliver a frame within the
//!   bounded wait. The acquisition is aborted; the trigger mode is left as
//!   last set.
//! - **`CalibrationUnavailable`**: The spectrograph cannot report a wavelength
//!   table. Callers must treat the wavelength axis as absent, not zero-filled.
//! - **`Config`** / **`Io`** / **`Storage`**: wrapped configuration, I/O and
//!   file-writer failures.
//!
//! By using `#[from]`, `SpectroError` can be seamlessly created from the
//! underlying error types, simplifying error handling throughout the
//! application with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SpectroError>;

/// Application-wide error taxonomy.
#[derive(Error, Debug)]
pub enum SpectroError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Device is not connected")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Acquisition timed out after {0:.1} s")]
    AcquisitionTimeout(f64),

    #[error("Wavelength calibration unavailable: {0}")]
    CalibrationUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SpectroError::Hardware("camera rejected SetExposure".to_string());
        assert_eq!(
            err.to_string(),
            "Hardware error: camera rejected SetExposure"
        );
    }

    #[test]
    fn test_timeout_display_includes_bound() {
        let err = SpectroError::AcquisitionTimeout(1.5);
        assert!(err.to_string().contains("1.5 s"));
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = SpectroError::InvalidArgument("exposure must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid argument: exposure must be positive"
        );
    }
}
