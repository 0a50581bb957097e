use std::sync::Arc;

use flowkeep_config::AssemblerConfig;
use flowkeep_core::prelude::*;
use flowkeep_storage::{FileBlobStore, JsonLinesSink};
use flowkeep_telemetry::MetricsRecorder;

#[test]
fn records_and_blobs_land_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = Arc::new(FileBlobStore::open(dir.path().join("blobs")).unwrap());
    let records_path = dir.path().join("records.jsonl");
    let sink = Arc::new(JsonLinesSink::create(&records_path).unwrap());

    let pool = ConnectionPool::new(
        AssemblerConfig {
            max_inline_bytes: 8,
            ..Default::default()
        },
        blobs.clone(),
        sink.clone(),
        Arc::new(MetricsRecorder::new()),
        "disk.trace",
    );

    let client = EndpointPair::new(
        "192.0.2.10:50000".parse().unwrap(),
        "192.0.2.20:21".parse().unwrap(),
    );
    pool.process(Segment::new(client, 0, TcpFlags::SYN, "", 1_000_000));
    pool.process(Segment::new(client.reversed(), 0, TcpFlags::SYN_ACK, "", 2_000_000));
    pool.process(Segment::new(client.reversed(), 1, TcpFlags::ACK, "220 ready\r\n", 3_000_000));
    pool.process(Segment::new(client, 1, TcpFlags::ACK, "USER anonymous\r\n", 4_000_000));
    pool.flush_all();
    pool.drain();
    sink.flush().unwrap();

    let content = std::fs::read_to_string(&records_path).unwrap();
    let records: Vec<FlowEntry> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.filename, "disk.trace");
    assert_eq!(record.flow[0].from, Direction::ServerToClient);
    assert_eq!(record.flow[0].data, "220 read");
    assert!(record.flow[1].data.is_empty());

    let full = blobs.read(record.flow[1].raw.as_ref().unwrap()).unwrap();
    assert_eq!(full, b"USER anonymous\r\n");
}
