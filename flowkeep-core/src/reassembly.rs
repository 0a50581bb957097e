//! Per-direction reassembly buffer.
//!
//! Segments are keyed by their absolute offset in the stream. Sequence
//! numbers are unwrapped relative to the next expected sequence number, so
//! streams crossing the 2^32 boundary reassemble like any other.
//!
//! A stream is anchored by the sender's SYN. Without one, nothing is known
//! about where the stream starts: data is held until a forced release, which
//! anchors at the lowest buffered sequence number.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// An ordered byte range handed to the record builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub data: Bytes,
    /// Capture time of the segment that triggered the release.
    pub timestamp: u64,
    /// This release reached the sender's FIN.
    pub fin: bool,
}

/// Buffer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub segments: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub gaps_skipped: u64,
    pub bytes_released: u64,
}

#[derive(Debug)]
struct Pending {
    data: Bytes,
    timestamp: u64,
}

/// Offset of the first segment seen on an unanchored stream. Leaves room
/// for segments up to 2^31 bytes earlier.
const PROVISIONAL_ORIGIN: u64 = 1 << 32;

#[derive(Debug)]
pub struct ReassemblyBuffer {
    /// Sequence number matching `next_offset`, once any segment was seen.
    next_seq: Option<u32>,
    /// The stream start is known; contiguous data is released as it arrives.
    anchored: bool,
    /// Absolute stream offset matching `next_seq`.
    next_offset: u64,
    pending: BTreeMap<u64, Pending>,
    buffered_bytes: usize,
    max_buffered_bytes: usize,
    fin_offset: Option<u64>,
    closed: bool,
    stats: BufferStats,
}

impl ReassemblyBuffer {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            next_seq: None,
            anchored: false,
            next_offset: PROVISIONAL_ORIGIN,
            pending: BTreeMap::new(),
            buffered_bytes: 0,
            max_buffered_bytes,
            fin_offset: None,
            closed: false,
            stats: BufferStats::default(),
        }
    }

    /// Anchor the stream on the sender's SYN. Ignored once the start is known.
    ///
    /// Data buffered before the SYN keeps its place; it is released by the
    /// next submit or forced flush.
    pub fn set_initial_seq(&mut self, isn: u32) {
        if self.anchored {
            return;
        }
        let start = isn.wrapping_add(1); // SYN consumes one seq
        if let Some(provisional) = self.next_seq {
            let delta = start.wrapping_sub(provisional) as i32 as i64;
            self.next_offset = (self.next_offset as i64 + delta) as u64;
        }
        self.next_seq = Some(start);
        self.anchored = true;
    }

    /// Submit a segment; returns the ranges that became contiguous.
    ///
    /// On an unanchored stream nothing is released until the buffer bound is
    /// exceeded. A zero-length release is returned when a bare FIN closes the
    /// half.
    pub fn submit(&mut self, seq: u32, payload: Bytes, fin: bool, timestamp: u64) -> Vec<Released> {
        self.stats.segments += 1;
        let next_seq = *self.next_seq.get_or_insert(seq);

        let delta = seq.wrapping_sub(next_seq) as i32 as i64;
        let start = self.next_offset as i64 + delta;
        let end = start + payload.len() as i64;
        let next = self.next_offset as i64;

        if fin && self.fin_offset.is_none() {
            let fin_at = if self.anchored { end.max(next) } else { end };
            self.fin_offset = Some(fin_at as u64);
        }

        if !payload.is_empty() {
            if !self.anchored {
                self.store(start as u64, payload, timestamp);
            } else if end <= next {
                self.stats.duplicates += 1;
                trace!(seq, len = payload.len(), "duplicate segment discarded");
            } else {
                let (start, data) = if start < next {
                    (next, payload.slice((next - start) as usize..))
                } else {
                    (start, payload)
                };
                if start > next {
                    self.stats.out_of_order += 1;
                }
                self.store(start as u64, data, timestamp);
            }
        }

        let was_closed = self.closed;
        let mut released = Vec::new();
        if self.anchored {
            released.extend(self.release_contiguous(Some(timestamp)));
        }
        if self.buffered_bytes > self.max_buffered_bytes {
            trace!(buffered = self.buffered_bytes, "buffer bound exceeded, skipping gaps");
            released.extend(self.skip_gaps());
        }
        self.finish_release(was_closed, &mut released, timestamp);
        released
    }

    /// Release everything buffered, skipping gaps, if any buffered segment
    /// was captured before `cutoff`.
    pub fn force_flush_older_than(&mut self, cutoff: u64) -> Vec<Released> {
        if self.pending.values().any(|p| p.timestamp < cutoff) {
            self.force_flush()
        } else {
            Vec::new()
        }
    }

    /// Release everything buffered, skipping gaps. An unanchored stream is
    /// anchored at its lowest buffered sequence number.
    pub fn force_flush(&mut self) -> Vec<Released> {
        let was_closed = self.closed;
        let mut released = self.skip_gaps();
        if let Some(fin) = self.fin_offset {
            if fin > self.next_offset {
                self.stats.gaps_skipped += 1;
                self.advance(fin - self.next_offset);
            }
        }
        let timestamp = released.last().map(|r| r.timestamp).unwrap_or_default();
        self.finish_release(was_closed, &mut released, timestamp);
        released
    }

    /// All data before the sender's FIN has been released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    fn store(&mut self, start: u64, data: Bytes, timestamp: u64) {
        if let Some(existing) = self.pending.get(&start) {
            if existing.data.len() >= data.len() {
                self.stats.duplicates += 1;
                return;
            }
        }
        self.buffered_bytes += data.len();
        if let Some(replaced) = self.pending.insert(start, Pending { data, timestamp }) {
            self.buffered_bytes -= replaced.data.len();
        }
    }

    /// Pop the run starting at the next expected offset.
    fn release_contiguous(&mut self, trigger: Option<u64>) -> Option<Released> {
        let mut parts: Vec<Bytes> = Vec::new();
        let mut latest = 0u64;

        while let Some(entry) = self.pending.first_entry() {
            let start = *entry.key();
            if start > self.next_offset {
                break;
            }
            let piece = entry.remove();
            self.buffered_bytes -= piece.data.len();
            let end = start + piece.data.len() as u64;
            if end <= self.next_offset {
                self.stats.duplicates += 1;
                continue;
            }
            let skip = (self.next_offset - start) as usize;
            let data = piece.data.slice(skip..);
            self.advance(data.len() as u64);
            latest = latest.max(piece.timestamp);
            parts.push(data);
        }

        if parts.is_empty() {
            return None;
        }

        let data = if parts.len() == 1 {
            parts.pop().unwrap_or_default()
        } else {
            let total = parts.iter().map(Bytes::len).sum();
            let mut joined = BytesMut::with_capacity(total);
            for part in &parts {
                joined.extend_from_slice(part);
            }
            joined.freeze()
        };
        self.stats.bytes_released += data.len() as u64;

        Some(Released {
            data,
            timestamp: trigger.unwrap_or(latest),
            fin: false,
        })
    }

    fn anchor_at_lowest(&mut self) {
        if self.anchored {
            return;
        }
        self.anchored = true;
        if let Some((&lowest, _)) = self.pending.first_key_value() {
            let shift = lowest as i64 - self.next_offset as i64;
            self.next_seq = self.next_seq.map(|seq| seq.wrapping_add(shift as u32));
            self.next_offset = lowest;
        }
    }

    fn skip_gaps(&mut self) -> Vec<Released> {
        self.anchor_at_lowest();
        let mut released = Vec::new();
        while let Some((&start, _)) = self.pending.first_key_value() {
            if start > self.next_offset {
                self.stats.gaps_skipped += 1;
                trace!(gap = start - self.next_offset, "skipping sequence gap");
                self.advance(start - self.next_offset);
            }
            if let Some(run) = self.release_contiguous(None) {
                released.push(run);
            }
        }
        released
    }

    fn finish_release(&mut self, was_closed: bool, released: &mut Vec<Released>, timestamp: u64) {
        if was_closed || !self.anchored {
            return;
        }
        if matches!(self.fin_offset, Some(fin) if self.next_offset >= fin) {
            self.closed = true;
            match released.last_mut() {
                Some(last) => last.fin = true,
                None => released.push(Released {
                    data: Bytes::new(),
                    timestamp,
                    fin: true,
                }),
            }
        }
    }

    fn advance(&mut self, n: u64) {
        self.next_offset += n;
        if let Some(seq) = self.next_seq.as_mut() {
            *seq = seq.wrapping_add(n as u32);
        }
    }
}
