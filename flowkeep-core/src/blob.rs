//! Full-fidelity payload storage.
//!
//! Every released byte range is written to a blob store regardless of the
//! inline cap, so records can reference the complete payload.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::BlobError;
use crate::flow::{Direction, EndpointPair};

/// Opaque identifier handed out by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Context attached to a newly inserted blob.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub endpoints: EndpointPair,
    pub direction: Direction,
    /// Capture time of the first byte, in nanoseconds.
    pub timestamp: u64,
    /// Capture batch the data came from.
    pub source: Arc<str>,
}

/// Storage for the untruncated payload of each chunk.
pub trait BlobStore: Send + Sync {
    fn insert(&self, data: &[u8], meta: &BlobMeta) -> Result<BlobId, BlobError>;

    fn append(&self, id: &BlobId, data: &[u8]) -> Result<(), BlobError>;
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobId, Vec<u8>>>,
    next_id: Mutex<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &BlobId) -> Option<Vec<u8>> {
        self.blobs.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn insert(&self, data: &[u8], meta: &BlobMeta) -> Result<BlobId, BlobError> {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            BlobId(format!("{}-{}-{}", meta.source, meta.direction.as_tag(), *next))
        };
        self.blobs.lock().insert(id.clone(), data.to_vec());
        Ok(id)
    }

    fn append(&self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        match self.blobs.lock().get_mut(id) {
            Some(blob) => {
                blob.extend_from_slice(data);
                Ok(())
            }
            None => Err(BlobError::NotFound(id.clone())),
        }
    }
}
