use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Direction of a segment relative to the connection's client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "c")]
    ClientToServer,
    #[serde(rename = "s")]
    ServerToClient,
}

impl Direction {
    /// Record tag: `"c"` or `"s"`.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "c",
            Direction::ServerToClient => "s",
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }

    /// Index into per-direction arrays.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        match self {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
        }
    }
}

/// Source and destination of a segment, as captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointPair {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl EndpointPair {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }

    /// Canonical key shared by both directions of the connection.
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.src, self.dst)
    }
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Normalized connection key (lower endpoint first for consistent lookup).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionKey {
    a: SocketAddr,
    b: SocketAddr,
}

impl ConnectionKey {
    /// Ensures `a <= b` so both directions map to the same key.
    pub fn new(x: SocketAddr, y: SocketAddr) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        (self.a, self.b)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}
