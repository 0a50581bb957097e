//! # flowkeep-storage
//!
//! Filesystem collaborators for the stream assembler:
//! - [`FileBlobStore`]: one file per full-fidelity chunk payload
//! - [`JsonLinesSink`]: completed records as JSON, one per line

pub mod blob;
pub mod error;
pub mod records;

pub use blob::FileBlobStore;
pub use error::StorageError;
pub use records::JsonLinesSink;
