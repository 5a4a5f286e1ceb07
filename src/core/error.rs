//! Error types for the engine
//!
//! Only conditions the caller has to correct (or infrastructure failures)
//! are errors. Missing baselines or buildings are ordinary outcomes and live
//! in [`crate::mrv::SavingsOutcome`] instead.

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// No consumption samples were available for a baseline
    #[error("No data: {0}")]
    NoData(String),

    /// Caller supplied malformed input (period, kWh value, date range)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A normalization stage broke the pipeline contract
    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the caller can fix this by changing the request
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::NoData(_) | Error::InvalidInput(_))
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoData("no meter readings found for building".to_string());
        assert_eq!(err.to_string(), "No data: no meter readings found for building");

        let err = Error::InvalidInput("period '2025-13' is not YYYY-MM".to_string());
        assert_eq!(err.to_string(), "Invalid input: period '2025-13' is not YYYY-MM");
    }

    #[test]
    fn test_input_error_classification() {
        assert!(Error::NoData(String::new()).is_input_error());
        assert!(Error::InvalidInput(String::new()).is_input_error());
        assert!(!Error::Normalization(String::new()).is_input_error());
        assert!(!Error::Database(rusqlite::Error::QueryReturnedNoRows).is_input_error());
    }
}
