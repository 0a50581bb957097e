use std::path::PathBuf;

use flowkeep_core::error::{BlobError, SinkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot prepare storage directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("Record encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for BlobError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(e) => BlobError::Io(e),
            other => BlobError::Unavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for SinkError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(e) => SinkError::Io(e),
            other => SinkError::Rejected(other.to_string()),
        }
    }
}
