//! Output locations for blobs and records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Storage configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StorageConfig {
    /// Directory receiving one file per full-fidelity blob.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,

    /// JSON-lines file receiving completed records; stdout when unset.
    #[serde(default)]
    pub records: Option<PathBuf>,
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("blobs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: default_blob_dir(),
            records: None,
        }
    }
}
