//! Segment traces: one already-parsed segment per JSON line.
//!
//! ```text
//! {"ts": 1700000000000000000, "src": "10.0.0.1:40000", "dst": "10.0.0.2:80",
//!  "seq": 1, "flags": "PA", "payload": "474554202f"}
//! ```
//!
//! Flag letters: `S` SYN, `A` ACK, `F` FIN, `R` RST. Other letters (`P`,
//! `U`, ...) are accepted and ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::net::SocketAddr;
use std::path::Path;

use flowkeep_core::flow::{EndpointPair, Segment, TcpFlags};
use serde::Deserialize;

use crate::error::TraceError;

#[derive(Debug, Deserialize)]
struct TraceLine {
    ts: u64,
    src: SocketAddr,
    dst: SocketAddr,
    seq: u32,
    #[serde(default)]
    flags: String,
    #[serde(default)]
    payload: String,
}

pub fn parse_flags(letters: &str) -> TcpFlags {
    let mut flags = TcpFlags::NONE;
    for letter in letters.chars() {
        match letter.to_ascii_uppercase() {
            'S' => flags.syn = true,
            'A' => flags.ack = true,
            'F' => flags.fin = true,
            'R' => flags.rst = true,
            _ => {}
        }
    }
    flags
}

fn parse_line(line: usize, text: &str) -> Result<Segment, TraceError> {
    let malformed = |reason: String| TraceError::Malformed { line, reason };

    let raw: TraceLine = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    let payload = hex::decode(raw.payload.trim()).map_err(|e| malformed(format!("payload: {}", e)))?;

    Ok(Segment::new(
        EndpointPair::new(raw.src, raw.dst),
        raw.seq,
        parse_flags(&raw.flags),
        payload,
        raw.ts,
    ))
}

/// Iterates over the segments of a trace, skipping blank lines.
pub struct TraceReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl TraceReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<Segment, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(parse_line(self.line, &text));
        }
    }
}
