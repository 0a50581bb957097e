//! File-per-blob storage.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use blake3::Hasher;
use flowkeep_core::blob::{BlobId, BlobMeta, BlobStore};
use flowkeep_core::error::BlobError;
use tracing::{debug, info};

use crate::error::StorageError;

/// Stores each blob as a file named by its id under one directory.
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    counter: AtomicU64,
}

impl FileBlobStore {
    /// Open (and create if needed) the blob directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Directory {
            path: dir.clone(),
            source,
        })?;
        info!("Blob store at {}", dir.display());
        Ok(Self {
            dir,
            counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, id: &BlobId) -> Result<PathBuf, StorageError> {
        if id.0.is_empty() || !id.0.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidBlobId(id.0.clone()));
        }
        Ok(self.dir.join(&id.0))
    }

    pub fn read(&self, id: &BlobId) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.path_of(id)?)?)
    }

    fn next_id(&self, meta: &BlobMeta) -> BlobId {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Hasher::new();
        hasher.update(meta.source.as_bytes());
        hasher.update(meta.endpoints.to_string().as_bytes());
        hasher.update(meta.direction.as_tag().as_bytes());
        hasher.update(&meta.timestamp.to_le_bytes());
        hasher.update(&counter.to_le_bytes());
        BlobId(hex::encode(hasher.finalize().as_bytes()))
    }
}

impl BlobStore for FileBlobStore {
    fn insert(&self, data: &[u8], meta: &BlobMeta) -> Result<BlobId, BlobError> {
        let id = self.next_id(meta);
        let path = self.path_of(&id)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(data)?;
        debug!(blob = %id, len = data.len(), "Blob created");
        Ok(id)
    }

    fn append(&self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        let path = self.path_of(id)?;
        let mut file = match OpenOptions::new().append(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BlobError::NotFound(id.clone())),
            Err(e) => return Err(e.into()),
        };
        file.write_all(data)?;
        Ok(())
    }
}
