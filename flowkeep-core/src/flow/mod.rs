//! Connection identity and the segments that feed it.

pub mod key;
pub mod segment;

pub use key::{ConnectionKey, Direction, EndpointPair};
pub use segment::{to_millis, Segment, TcpFlags};
