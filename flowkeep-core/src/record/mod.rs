//! Output records.
//!
//! A [`FlowEntry`] is the materialized form of one completed connection:
//! its endpoints, timing, metadata and the ordered list of [`FlowItem`]
//! chunks. Field names follow the stored document schema.

pub mod builder;

use serde::{Deserialize, Serialize};

pub use crate::blob::BlobId;
use crate::flow::Direction;

pub use builder::{Origin, RecordBuilder, RecordDraft};

/// One maximal run of same-direction data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowItem {
    pub from: Direction,
    /// Inline text copy of the payload, possibly truncated by the inline
    /// cap. Invalid UTF-8 is replaced.
    pub data: String,
    /// Full payload, unless the blob store failed.
    pub raw: Option<BlobId>,
    /// Capture time of the first byte (ms).
    pub time: i64,
}

/// A completed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub src_port: u16,
    pub dst_port: u16,
    pub src_ip: String,
    pub dst_ip: String,
    /// Time of the first chunk (ms).
    pub time: i64,
    /// Last chunk time minus first chunk time (ms).
    pub duration: i64,
    pub inx: i64,
    pub starred: bool,
    pub blocked: bool,
    pub tags: Vec<String>,
    pub suricata: Vec<i64>,
    /// Capture batch the connection was seen in.
    pub filename: String,
    pub flow: Vec<FlowItem>,
    /// The connection broke the handshake rules at least once.
    #[serde(default)]
    pub anomalous: bool,
}

impl FlowEntry {
    /// Text bytes held inline across all chunks.
    pub fn inline_len(&self) -> usize {
        self.flow.iter().map(|item| item.data.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> FlowEntry {
        FlowEntry {
            src_port: 40000,
            dst_port: 80,
            src_ip: "10.0.0.1".into(),
            dst_ip: "10.0.0.2".into(),
            time: 1_000,
            duration: 5,
            inx: 0,
            starred: false,
            blocked: false,
            tags: Vec::new(),
            suricata: Vec::new(),
            filename: "capture-1.pcap".into(),
            flow: vec![
                FlowItem {
                    from: Direction::ClientToServer,
                    data: "GET /\r\n".into(),
                    raw: Some(BlobId("b1".into())),
                    time: 1_000,
                },
                FlowItem {
                    from: Direction::ServerToClient,
                    data: "\u{fffd}ok".into(),
                    raw: None,
                    time: 1_005,
                },
            ],
            anomalous: false,
        }
    }

    #[test]
    fn serializes_document_schema() {
        let value = serde_json::to_value(entry()).unwrap();
        assert_eq!(value["src_port"], 40000);
        assert_eq!(value["filename"], "capture-1.pcap");
        assert_eq!(value["flow"][0]["from"], "c");
        assert_eq!(value["flow"][0]["data"], "GET /\r\n");
        assert_eq!(value["flow"][0]["raw"], "b1");
        assert_eq!(value["flow"][1]["from"], "s");
        assert!(value["flow"][1]["raw"].is_null());
        assert_eq!(value["tags"], serde_json::json!([]));
    }

    #[test]
    fn inline_text_survives_a_round_trip() {
        let json = serde_json::to_string(&entry()).unwrap();
        let back: FlowEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry());
        assert_eq!(back.inline_len(), entry().inline_len());
    }

    #[test]
    fn inline_len_counts_text_bytes() {
        // U+FFFD is three bytes.
        assert_eq!(entry().inline_len(), 7 + 5);
    }
}
