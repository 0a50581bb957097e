//! Chunk list construction.
//!
//! Released byte ranges are appended in release order. Consecutive ranges
//! from the same direction are merged into one chunk, so adjacent chunks
//! always alternate direction. The inline copy is text (invalid UTF-8 is
//! replaced) and the cap applies to its length in bytes; the blob store
//! always receives every raw byte.

use std::sync::Arc;

use flowkeep_telemetry::MetricsRecorder;
use tracing::{trace, warn};

use super::FlowItem;
use crate::blob::{BlobMeta, BlobStore};
use crate::flow::{segment::to_millis, Direction, EndpointPair};
use crate::inflight::InFlight;

/// Where a connection's data came from, attached to every new blob.
#[derive(Debug, Clone)]
pub struct Origin {
    pub endpoints: EndpointPair,
    pub source: Arc<str>,
}

impl Origin {
    fn blob_meta(&self, direction: Direction, timestamp: u64) -> BlobMeta {
        BlobMeta {
            endpoints: self.endpoints,
            direction,
            timestamp,
            source: Arc::clone(&self.source),
        }
    }
}

/// The chunks of a connection that has not been emitted yet.
#[derive(Debug, Default)]
pub struct RecordDraft {
    chunks: Vec<FlowItem>,
    /// Inline text bytes produced so far, including truncated ones.
    total_bytes: usize,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[FlowItem] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// First chunk time and last chunk time (ms).
    pub fn time_span(&self) -> Option<(i64, i64)> {
        match (self.chunks.first(), self.chunks.last()) {
            (Some(first), Some(last)) => Some((first.time, last.time)),
            _ => None,
        }
    }

    pub fn take_chunks(&mut self) -> Vec<FlowItem> {
        std::mem::take(&mut self.chunks)
    }
}

pub struct RecordBuilder {
    max_inline_bytes: usize,
    blobs: Arc<dyn BlobStore>,
    inflight: Arc<InFlight>,
    metrics: Arc<MetricsRecorder>,
}

impl RecordBuilder {
    pub fn new(
        max_inline_bytes: usize,
        blobs: Arc<dyn BlobStore>,
        inflight: Arc<InFlight>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            max_inline_bytes,
            blobs,
            inflight,
            metrics,
        }
    }

    /// Append one released range to `draft`.
    pub fn append(
        &self,
        draft: &mut RecordDraft,
        direction: Direction,
        data: &[u8],
        timestamp: u64,
        origin: &Origin,
    ) {
        if data.is_empty() {
            return;
        }

        let text = String::from_utf8_lossy(data);
        let available = self.max_inline_bytes.saturating_sub(draft.total_bytes);
        let inline = &text[..floor_char_boundary(&text, available)];
        draft.total_bytes += text.len();
        if inline.len() < text.len() {
            let dropped = text.len() - inline.len();
            self.metrics.inline_bytes_truncated.inc_by(dropped as u64);
            trace!(dropped, connection = %origin.endpoints, "inline copy truncated");
        }

        if let Some(last) = draft.chunks.last_mut() {
            if last.from == direction {
                last.data.push_str(inline);
                if let Some(id) = &last.raw {
                    let _tracked = self.inflight.track();
                    if let Err(e) = self.blobs.append(id, data) {
                        self.metrics.blob_failures.inc();
                        warn!(error = %e, blob = %id, connection = %origin.endpoints, "Blob append failed");
                    }
                }
                return;
            }
        }

        let raw = {
            let _tracked = self.inflight.track();
            match self.blobs.insert(data, &origin.blob_meta(direction, timestamp)) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.metrics.blob_failures.inc();
                    warn!(error = %e, connection = %origin.endpoints, "Blob insert failed");
                    None
                }
            }
        };

        draft.chunks.push(FlowItem {
            from: direction,
            data: inline.to_owned(),
            raw,
            time: to_millis(timestamp),
        });
    }
}

/// Largest char boundary of `text` not above `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
