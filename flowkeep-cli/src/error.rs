use flowkeep_config::ConfigError;
use flowkeep_storage::StorageError;
use thiserror::Error;

/// A trace line that could not be turned into a segment.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Trace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Cannot read trace {path}: {source}")]
    Trace {
        path: String,
        #[source]
        source: TraceError,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
