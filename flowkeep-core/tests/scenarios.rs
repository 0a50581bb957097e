//! End-to-end connection scenarios driven through the pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Receiver;
use flowkeep_config::{AssemblerConfig, HandshakeMode};
use flowkeep_core::prelude::*;
use flowkeep_telemetry::MetricsRecorder;
use parking_lot::Mutex;

const CLIENT: &str = "10.1.1.5:41234";
const SERVER: &str = "10.1.1.9:80";

fn ms(value: u64) -> u64 {
    value * 1_000_000
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn c2s() -> EndpointPair {
    EndpointPair::new(addr(CLIENT), addr(SERVER))
}

fn s2c() -> EndpointPair {
    c2s().reversed()
}

/// Blob store that records every call it sees.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryBlobStore,
    inserts: Mutex<Vec<Vec<u8>>>,
    appends: Mutex<Vec<Vec<u8>>>,
}

impl BlobStore for RecordingStore {
    fn insert(&self, data: &[u8], meta: &BlobMeta) -> Result<BlobId, BlobError> {
        self.inserts.lock().push(data.to_vec());
        self.inner.insert(data, meta)
    }

    fn append(&self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        self.appends.lock().push(data.to_vec());
        self.inner.append(id, data)
    }
}

struct Harness {
    pool: ConnectionPool,
    store: Arc<RecordingStore>,
    records: Receiver<FlowEntry>,
    metrics: Arc<MetricsRecorder>,
}

impl Harness {
    fn new(config: AssemblerConfig) -> Self {
        let store = Arc::new(RecordingStore::default());
        let metrics = Arc::new(MetricsRecorder::new());
        let (sink, records) = ChannelSink::unbounded();
        let pool = ConnectionPool::new(
            config,
            store.clone(),
            Arc::new(sink),
            metrics.clone(),
            "scenario.trace",
        );
        Self {
            pool,
            store,
            records,
            metrics,
        }
    }

    fn lenient() -> Self {
        Self::new(AssemblerConfig::default())
    }

    fn send(&self, endpoints: EndpointPair, seq: u32, flags: TcpFlags, payload: &'static str, ts: u64) {
        self.pool
            .process(Segment::new(endpoints, seq, flags, payload, ts));
    }

    fn handshake(&self, client_isn: u32, server_isn: u32, ts: u64) {
        self.send(c2s(), client_isn, TcpFlags::SYN, "", ts);
        self.send(s2c(), server_isn, TcpFlags::SYN_ACK, "", ts);
        self.send(c2s(), client_isn.wrapping_add(1), TcpFlags::ACK, "", ts);
    }

    fn finish(&self) -> Vec<FlowEntry> {
        self.pool.flush_all();
        self.pool.drain();
        self.records.try_iter().collect()
    }

    fn emitted(&self) -> Vec<FlowEntry> {
        self.records.try_iter().collect()
    }
}

fn assert_alternating(record: &FlowEntry) {
    for pair in record.flow.windows(2) {
        assert_ne!(pair[0].from, pair[1].from, "adjacent chunks share a direction");
    }
}

#[test]
fn same_direction_segments_merge_into_one_chunk() {
    let h = Harness::lenient();
    h.handshake(100, 500, ms(999));
    h.send(c2s(), 101, TcpFlags::ACK, "GET /\r\n", ms(1000));
    h.send(c2s(), 108, TcpFlags::ACK, "Host: x\r\n", ms(1001));

    let records = h.finish();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.flow.len(), 1);
    assert_eq!(record.flow[0].from, Direction::ClientToServer);
    assert_eq!(record.flow[0].data, "GET /\r\nHost: x\r\n");
    assert_eq!(record.flow[0].time, 1000);
    assert_eq!(record.time, 1000);
    assert_eq!(record.src_ip, "10.1.1.5");
    assert_eq!(record.src_port, 41234);
    assert_eq!(record.dst_port, 80);
    assert_eq!(record.filename, "scenario.trace");
    assert!(!record.anomalous);
}

#[test]
fn alternating_directions_keep_their_order() {
    let h = Harness::lenient();
    h.handshake(0, 1000, ms(1));
    h.send(c2s(), 1, TcpFlags::ACK, "A", ms(10));
    h.send(s2c(), 1001, TcpFlags::ACK, "B", ms(20));
    h.send(c2s(), 2, TcpFlags::ACK, "C", ms(35));

    let records = h.finish();
    let record = &records[0];
    let tags: Vec<_> = record.flow.iter().map(|item| item.from.as_tag()).collect();
    assert_eq!(tags, vec!["c", "s", "c"]);
    assert_eq!(record.duration, 25);
    assert_alternating(record);
}

#[test]
fn inline_cap_truncates_while_blob_keeps_everything() {
    let h = Harness::new(AssemblerConfig {
        max_inline_bytes: 5,
        ..Default::default()
    });
    h.handshake(0, 1000, ms(1));
    h.send(c2s(), 1, TcpFlags::ACK, "ABC", ms(2));
    h.send(s2c(), 1001, TcpFlags::ACK, "DEFGHIJ", ms(3));

    let records = h.finish();
    let record = &records[0];
    assert_eq!(record.flow[0].data, "ABC");
    assert_eq!(record.flow[1].data, "DE");
    assert!(record.inline_len() <= 5);

    let raw = record.flow[1].raw.as_ref().expect("blob reference");
    assert_eq!(h.store.inner.get(raw).unwrap(), b"DEFGHIJ");
    assert_eq!(h.metrics.inline_bytes_truncated.get(), 5);
}

#[test]
fn handshake_and_close_without_data_emits_nothing() {
    let h = Harness::lenient();
    h.handshake(0, 1000, ms(1));
    h.send(c2s(), 1, TcpFlags::FIN_ACK, "", ms(2));
    h.send(s2c(), 1001, TcpFlags::FIN_ACK, "", ms(3));
    assert!(h.pool.is_empty(), "empty connection evicted on teardown");
    h.send(c2s(), 2, TcpFlags::ACK, "", ms(4));

    assert!(h.finish().is_empty());
    assert_eq!(h.metrics.records_emitted.get(), 0);
    assert!(h.metrics.connections_discarded.get() >= 1);
}

#[test]
fn out_of_order_run_is_released_once() {
    let h = Harness::lenient();
    h.handshake(999, 5000, ms(1));
    let late_half = "bbbbbbbbbbbbbbbbbbbb";
    let early_half = "aaaaaaaaaa";
    h.send(c2s(), 1010, TcpFlags::ACK, late_half, ms(2));
    assert!(h.store.inserts.lock().is_empty(), "nothing released across the gap");
    h.send(c2s(), 1000, TcpFlags::ACK, early_half, ms(3));

    assert_eq!(h.store.inserts.lock().len(), 1);
    assert_eq!(h.store.inserts.lock()[0].len(), 30);
    assert!(h.store.appends.lock().is_empty());

    let records = h.finish();
    assert_eq!(records[0].flow.len(), 1);
    assert_eq!(
        records[0].flow[0].data,
        format!("{}{}", early_half, late_half)
    );
    assert_eq!(records[0].flow[0].time, 3);
}

#[test]
fn orderly_close_emits_and_lingers() {
    let h = Harness::lenient();
    h.handshake(0, 1000, ms(1));
    h.send(c2s(), 1, TcpFlags::ACK, "hello", ms(2));
    h.send(s2c(), 1001, TcpFlags::ACK, "world", ms(3));
    h.send(c2s(), 6, TcpFlags::FIN_ACK, "", ms(4));
    h.send(s2c(), 1006, TcpFlags::FIN_ACK, "", ms(5));

    let records = h.emitted();
    assert_eq!(records.len(), 1);
    assert_eq!(h.pool.len(), 1, "completed connection stays resident");

    let conn = h.pool.route(&Segment::new(c2s(), 7, TcpFlags::ACK, "", ms(6)));
    h.send(c2s(), 7, TcpFlags::ACK, "", ms(6));
    assert_eq!(conn.handshake_state().as_str(), "closed");

    // Trailing payload is counted, not reassembled.
    h.send(s2c(), 1007, TcpFlags::ACK, "late", ms(7));
    assert_eq!(h.metrics.segments_late.get(), 1);

    assert!(h.finish().is_empty(), "record is emitted exactly once");
    assert_eq!(h.metrics.records_emitted.get(), 1);
}

#[test]
fn reset_flushes_pending_data() {
    let h = Harness::lenient();
    h.handshake(0, 1000, ms(1));
    h.send(c2s(), 1, TcpFlags::ACK, "one", ms(2));
    // bytes 4..6 never arrive
    h.send(c2s(), 7, TcpFlags::ACK, "three", ms(3));
    h.send(s2c(), 1001, TcpFlags::RST, "", ms(4));

    let records = h.emitted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow[0].data, "onethree");
    assert_eq!(h.metrics.gaps_skipped.get(), 1);
}

#[test]
fn strict_mode_ignores_mid_stream_connections() {
    let strict = Harness::new(AssemblerConfig {
        handshake: HandshakeMode::Strict,
        ..Default::default()
    });
    strict.send(c2s(), 4000, TcpFlags::ACK, "mid-stream", ms(1));
    strict.send(s2c(), 9000, TcpFlags::ACK, "reply", ms(2));
    assert!(strict.finish().is_empty());
    assert_eq!(strict.metrics.segments_rejected.get(), 2);

    let lenient = Harness::lenient();
    lenient.send(c2s(), 4000, TcpFlags::ACK, "mid-stream", ms(1));
    lenient.send(s2c(), 9000, TcpFlags::ACK, "reply", ms(2));
    let records = lenient.finish();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow.len(), 2);
}

#[test]
fn strict_mode_rejects_out_of_state_segments() {
    let h = Harness::new(AssemblerConfig {
        handshake: HandshakeMode::Strict,
        ..Default::default()
    });
    h.send(c2s(), 0, TcpFlags::SYN, "", ms(1));
    // Data before the server answered.
    h.send(c2s(), 1, TcpFlags::ACK, "early", ms(2));
    h.send(s2c(), 1000, TcpFlags::SYN_ACK, "", ms(3));
    h.send(c2s(), 1, TcpFlags::ACK, "proper", ms(4));

    let records = h.finish();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow[0].data, "proper");
    assert!(records[0].anomalous);
    assert_eq!(h.metrics.protocol_anomalies.get(), 1);
}

#[test]
fn idle_connection_completes_then_evicts() {
    let config = AssemblerConfig {
        pending_timeout: Duration::from_secs(60),
        close_timeout: Duration::from_secs(600),
        ..Default::default()
    };
    let h = Harness::new(config);
    h.handshake(0, 1000, ms(1_000));
    h.send(c2s(), 1, TcpFlags::ACK, "part one", ms(1_000));
    // Stalled behind a gap.
    h.send(c2s(), 20, TcpFlags::ACK, "part two", ms(2_000));

    assert_eq!(h.pool.sweep(ms(30_000)), 0);
    assert!(h.emitted().is_empty());

    assert_eq!(h.pool.sweep(ms(62_000)), 0, "emitted connection lingers");
    let records = h.emitted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow[0].data, "part onepart two");
    assert_eq!(h.pool.len(), 1);

    assert_eq!(h.pool.sweep(ms(602_000)), 1);
    assert!(h.pool.is_empty());
    assert!(h.emitted().is_empty());
}

#[test]
fn stalled_gap_on_active_connection_is_skipped() {
    let config = AssemblerConfig {
        pending_timeout: Duration::from_secs(60),
        close_timeout: Duration::from_secs(600),
        ..Default::default()
    };
    let h = Harness::new(config);
    h.handshake(0, 1000, ms(0));
    h.send(c2s(), 1, TcpFlags::ACK, "head", ms(0));
    h.send(c2s(), 50, TcpFlags::ACK, "tail", ms(10_000));
    // Keep the connection active from the server side.
    h.send(s2c(), 1001, TcpFlags::ACK, "ok", ms(65_000));

    h.pool.sweep(ms(75_000));
    assert!(h.emitted().is_empty(), "active connection not completed");
    assert_eq!(h.metrics.gaps_skipped.get(), 1);

    let records = h.finish();
    let data: Vec<_> = records[0].flow.iter().map(|item| item.data.clone()).collect();
    assert_eq!(data, vec!["head", "ok", "tail"]);
}

#[test]
fn close_timeout_completes_unemitted_connections() {
    let config = AssemblerConfig {
        pending_timeout: Duration::from_secs(60),
        close_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let h = Harness::new(config);
    h.send(c2s(), 1, TcpFlags::ACK, "only", ms(0));
    assert_eq!(h.pool.sweep(ms(60_000)), 1);
    assert_eq!(h.emitted().len(), 1);
    assert!(h.pool.is_empty());
}

#[test]
fn sweep_emits_in_creation_order() {
    let h = Harness::lenient();
    for port in [5003u16, 5001, 5002] {
        let endpoints = EndpointPair::new(SocketAddr::new(addr(CLIENT).ip(), port), addr(SERVER));
        h.pool
            .process(Segment::new(endpoints, 1, TcpFlags::ACK, "x", ms(1)));
    }
    let records = h.finish();
    let ports: Vec<_> = records.iter().map(|r| r.src_port).collect();
    assert_eq!(ports, vec![5003, 5001, 5002]);
}

#[test]
fn segment_after_discard_starts_a_fresh_connection() {
    let h = Harness::lenient();
    h.send(c2s(), 0, TcpFlags::RST, "", ms(1));
    assert!(h.pool.is_empty());
    h.send(c2s(), 0, TcpFlags::ACK, "again", ms(2));
    assert_eq!(h.pool.len(), 1);
    assert_eq!(h.finish().len(), 1);
    assert_eq!(h.metrics.connections_created.get(), 2);
}

#[test]
fn failing_blob_store_does_not_stop_records() {
    struct Broken;
    impl BlobStore for Broken {
        fn insert(&self, _: &[u8], _: &BlobMeta) -> Result<BlobId, BlobError> {
            Err(BlobError::Unavailable("read-only filesystem".into()))
        }
        fn append(&self, id: &BlobId, _: &[u8]) -> Result<(), BlobError> {
            Err(BlobError::NotFound(id.clone()))
        }
    }

    let metrics = Arc::new(MetricsRecorder::new());
    let (sink, rx) = ChannelSink::unbounded();
    let pool = ConnectionPool::new(
        AssemblerConfig::default(),
        Arc::new(Broken),
        Arc::new(sink),
        metrics.clone(),
        "broken.trace",
    );
    pool.process(Segment::new(c2s(), 1, TcpFlags::ACK, "data", ms(1)));
    pool.process(Segment::new(s2c(), 1, TcpFlags::ACK, "more", ms(2)));
    pool.flush_all();
    pool.drain();

    let record = rx.try_recv().unwrap();
    assert_eq!(record.flow.len(), 2);
    assert!(record.flow.iter().all(|item| item.raw.is_none()));
    assert_eq!(metrics.blob_failures.get(), 2);
}

#[test]
fn closure_sink_receives_records() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = seen.clone();
        move |record: FlowEntry| seen.lock().push(record)
    };
    let pool = ConnectionPool::new(
        AssemblerConfig::default(),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(sink),
        Arc::new(MetricsRecorder::new()),
        "closure.trace",
    );
    pool.process(Segment::new(c2s(), 1, TcpFlags::ACK, "hi", ms(1)));
    pool.flush_all();
    pool.drain();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn concurrent_sources_share_a_pool() {
    let h = Arc::new(Harness::lenient());
    let workers: Vec<_> = (0..4u16)
        .map(|worker| {
            let h = h.clone();
            thread::spawn(move || {
                for conn in 0..25u16 {
                    let port = 20_000 + worker * 100 + conn;
                    let endpoints =
                        EndpointPair::new(SocketAddr::new(addr(CLIENT).ip(), port), addr(SERVER));
                    h.pool
                        .process(Segment::new(endpoints, 1, TcpFlags::ACK, "ping", ms(1)));
                    h.pool.process(Segment::new(
                        endpoints.reversed(),
                        1,
                        TcpFlags::ACK,
                        "pong",
                        ms(2),
                    ));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let records = h.finish();
    assert_eq!(records.len(), 100);
    assert!(records.iter().all(|r| r.flow.len() == 2));
    assert_eq!(h.metrics.segments.get(), 200);
}

#[test]
fn mid_stream_connection_keeps_early_bytes() {
    let h = Harness::lenient();
    h.send(c2s(), 5010, TcpFlags::ACK, "bbbbbbbbbbbbbbbbbbbb", ms(2));
    h.send(c2s(), 5000, TcpFlags::ACK, "aaaaaaaaaa", ms(3));
    assert!(h.store.inserts.lock().is_empty(), "held until the start is known");

    let records = h.finish();
    assert_eq!(records[0].flow.len(), 1);
    assert_eq!(records[0].flow[0].data, "aaaaaaaaaabbbbbbbbbbbbbbbbbbbb");
    assert_eq!(h.metrics.duplicate_segments.get(), 0);
}
