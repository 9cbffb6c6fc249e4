//! Custom error types for the application.
//!
//! This module defines the primary error type, `PixError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure categories that can occur,
//! from configuration and I/O issues to detector-driver faults.
//!
//! ## Error Hierarchy
//!
//! `PixError` is an enum that consolidates the error sources:
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically related to
//!   file parsing or format issues in the configuration files.
//! - **`Configuration`**: Semantic errors in the configuration, such as values
//!   that parse but are logically invalid (e.g., an inverted time window).
//!   These are caught by the validation step.
//! - **`Io`**: Wraps standard `std::io::Error`, covering all file I/O issues.
//! - **`Driver`**: Failures reported by the detector/acquisition driver. The
//!   pipeline never retries these; the acquisition run halts.
//! - **`CorruptBuffer`**: An event buffer whose parallel arrays disagree in
//!   shape or whose pixel indices fall outside the sensor. Distinct from the
//!   (never erroneous) case of a buffer that is merely empty.
//! - **`Storage`** / **`Processing`**: Failures in the raw-event storage layer
//!   and the analysis stages respectively.
//! - **`FeatureNotEnabled`**: Returned when code reaches functionality (such
//!   as a storage backend) that was not compiled in via feature flags, with a
//!   message telling the user how to enable it.
//!
//! By using `#[from]`, `PixError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the application with
//! the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, PixError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum PixError {
    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The detector driver reported a failure.
    #[error("Driver error: {0}")]
    Driver(String),

    /// An event buffer arrived with an inconsistent shape.
    #[error("Corrupt event buffer: {0}")]
    CorruptBuffer(String),

    /// Raw-event storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Data processing error in one of the pipeline stages.
    #[error("Data processing error: {0}")]
    Processing(String),

    /// `start` was called while an acquisition is already in flight.
    #[error("Acquisition already running")]
    AcquisitionBusy,

    /// Requested functionality was not compiled in.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_buffer_message_carries_context() {
        let err = PixError::CorruptBuffer("index 70000 out of range".into());
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn io_error_converts() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(PixError::Io(_))));
    }
}
