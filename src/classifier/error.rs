//! Classifier error handling.

use thiserror::Error;

/// Errors raised by classifier clients.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The service answered with a non-success status.
    #[error("Classifier request failed: {0}")]
    ApiRequestFailed(String),

    /// The reply body did not have the expected shape.
    #[error("Invalid response format from classifier: {0}")]
    InvalidResponseFormat(String),

    /// The request never produced a response.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The endpoint could not be turned into a request URL.
    #[error("Invalid classifier endpoint: {0}")]
    InvalidEndpoint(String),
}

// Note: anyhow already has a blanket impl for thiserror::Error types
