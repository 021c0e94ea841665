//! Commit source errors.

use thiserror::Error;

/// Errors raised while talking to a commit source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source answered with a non-success status.
    #[error("Commit source request failed: {0}")]
    ApiRequestFailed(String),

    /// The response body could not be decoded.
    #[error("Invalid response format from commit source: {0}")]
    InvalidResponseFormat(String),

    /// The request never produced a response.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A URL could not be built from the configured base.
    #[error("Invalid commit source URL: {0}")]
    InvalidUrl(String),
}
