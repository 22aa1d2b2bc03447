//! Error types for the Tollgate service.

use thiserror::Error;

/// Failure of a single quota check.
///
/// Neither variant says anything about whether the request would have been
/// admitted. A denial is a successful check and is never represented here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The counter store could not be reached or did not answer in time.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The counter store answered with something we cannot interpret.
    #[error("Counter store protocol error: {0}")]
    StoreProtocol(String),
}

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors raised outside of a request
    #[error(transparent)]
    Store(#[from] CheckError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
