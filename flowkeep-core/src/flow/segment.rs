use bytes::Bytes;

use super::EndpointPair;

/// Control flags relevant to connection tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub const NONE: TcpFlags = TcpFlags {
        syn: false,
        ack: false,
        fin: false,
        rst: false,
    };
    pub const SYN: TcpFlags = TcpFlags {
        syn: true,
        ..TcpFlags::NONE
    };
    pub const SYN_ACK: TcpFlags = TcpFlags {
        syn: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const ACK: TcpFlags = TcpFlags {
        ack: true,
        ..TcpFlags::NONE
    };
    pub const FIN_ACK: TcpFlags = TcpFlags {
        fin: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const RST: TcpFlags = TcpFlags {
        rst: true,
        ..TcpFlags::NONE
    };
}

/// One captured, already-parsed transport segment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub endpoints: EndpointPair,
    pub seq: u32,
    pub flags: TcpFlags,
    pub payload: Bytes,
    /// Capture time in nanoseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Segment {
    pub fn new(
        endpoints: EndpointPair,
        seq: u32,
        flags: TcpFlags,
        payload: impl Into<Bytes>,
        timestamp: u64,
    ) -> Self {
        Self {
            endpoints,
            seq,
            flags,
            payload: payload.into(),
            timestamp,
        }
    }
}

/// Capture time in whole milliseconds, as stored in records.
#[inline]
pub fn to_millis(timestamp_ns: u64) -> i64 {
    (timestamp_ns / 1_000_000) as i64
}
