use thiserror::Error;

use crate::blob::BlobId;

/// Failure reported by a [`BlobStore`](crate::blob::BlobStore).
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob {0} not found")]
    NotFound(BlobId),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a [`RecordSink`](crate::sink::RecordSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Record sink closed")]
    Closed,

    #[error("Record rejected: {0}")]
    Rejected(String),

    #[error("Record sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}
