//! Result store errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by result store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("Failed to access result store at {path}: {source}")]
    Io {
        /// Backing file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A run could not be encoded.
    #[error("Failed to serialize analysis run: {0}")]
    Serialize(#[from] serde_json::Error),
}
