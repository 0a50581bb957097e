//! # flowkeep-core
//!
//! TCP stream reassembly and flow-record construction.
//!
//! Already-parsed segments enter through [`ConnectionPool::process`]. Each
//! connection validates its segments against a small handshake state
//! machine, reorders them per direction, merges same-direction data into
//! chunks and, once the connection is done, emits one [`FlowEntry`] to the
//! injected [`RecordSink`]. The full payload of every chunk goes to a
//! [`BlobStore`].
//!
//! ### Key Submodules:
//! - `flow`: connection keys, directions and segments
//! - `state`: handshake and teardown tracking
//! - `reassembly`: per-direction reordering buffer
//! - `record`: output records and the chunk builder
//! - `lifecycle`: completion and emission
//! - `pool`: connection factory, routing and sweeping

pub mod blob;
pub mod connection;
pub mod error;
pub mod flow;
pub mod inflight;
pub mod lifecycle;
pub mod pool;
pub mod reassembly;
pub mod record;
pub mod sink;
pub mod state;

pub mod prelude {
    pub use crate::blob::{BlobId, BlobMeta, BlobStore, MemoryBlobStore};
    pub use crate::error::{BlobError, SinkError};
    pub use crate::flow::{ConnectionKey, Direction, EndpointPair, Segment, TcpFlags};
    pub use crate::pool::ConnectionPool;
    pub use crate::record::{FlowEntry, FlowItem};
    pub use crate::sink::{ChannelSink, RecordSink};
}

pub use blob::{BlobStore, MemoryBlobStore};
pub use pool::ConnectionPool;
pub use record::FlowEntry;
pub use sink::RecordSink;
