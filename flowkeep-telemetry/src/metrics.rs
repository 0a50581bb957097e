//! ## flowkeep-telemetry::metrics
//! **Prometheus counters for the stream assembler**
//!
//! One recorder is shared (behind an `Arc`) by the pool, record builder and
//! lifecycle manager of a process. Each recorder owns its registry so tests
//! can create as many as they like.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub segments: IntCounter,
    pub segments_rejected: IntCounter,
    pub segments_late: IntCounter,
    pub protocol_anomalies: IntCounter,
    pub duplicate_segments: IntCounter,
    pub gaps_skipped: IntCounter,
    pub inline_bytes_truncated: IntCounter,
    pub blob_failures: IntCounter,
    pub sink_failures: IntCounter,
    pub records_emitted: IntCounter,
    pub connections_created: IntCounter,
    pub connections_discarded: IntCounter,
    pub connections_evicted: IntCounter,
    pub connections_resident: IntGauge,
    pub record_duration_ms: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid metric definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("metric registered once per registry");
    counter
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_resident = IntGauge::new(
            "flowkeep_connections_resident",
            "Connections currently held by the pool",
        )
        .expect("valid metric definition");
        registry
            .register(Box::new(connections_resident.clone()))
            .expect("metric registered once per registry");

        let record_duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "flowkeep_record_duration_ms",
                "Duration of emitted records (first to last chunk)",
            )
            .buckets(vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0, 60_000.0, 600_000.0]),
        )
        .expect("valid metric definition");
        registry
            .register(Box::new(record_duration_ms.clone()))
            .expect("metric registered once per registry");

        Self {
            segments: counter(&registry, "flowkeep_segments_total", "Segments delivered"),
            segments_rejected: counter(
                &registry,
                "flowkeep_segments_rejected_total",
                "Segments rejected by the state machine",
            ),
            segments_late: counter(
                &registry,
                "flowkeep_segments_late_total",
                "Segments observed after their connection was emitted",
            ),
            protocol_anomalies: counter(
                &registry,
                "flowkeep_protocol_anomalies_total",
                "Out-of-state segments",
            ),
            duplicate_segments: counter(
                &registry,
                "flowkeep_duplicate_segments_total",
                "Segments fully covered by released data",
            ),
            gaps_skipped: counter(
                &registry,
                "flowkeep_gaps_skipped_total",
                "Sequence gaps skipped by forced flushes",
            ),
            inline_bytes_truncated: counter(
                &registry,
                "flowkeep_inline_bytes_truncated_total",
                "Payload bytes dropped from inline copies by the size cap",
            ),
            blob_failures: counter(
                &registry,
                "flowkeep_blob_failures_total",
                "Failed blob inserts and appends",
            ),
            sink_failures: counter(
                &registry,
                "flowkeep_sink_failures_total",
                "Records the sink failed to accept",
            ),
            records_emitted: counter(
                &registry,
                "flowkeep_records_emitted_total",
                "Records handed to the sink",
            ),
            connections_created: counter(
                &registry,
                "flowkeep_connections_created_total",
                "Connections created by the pool",
            ),
            connections_discarded: counter(
                &registry,
                "flowkeep_connections_discarded_total",
                "Completed connections without data",
            ),
            connections_evicted: counter(
                &registry,
                "flowkeep_connections_evicted_total",
                "Connections removed from the pool",
            ),
            connections_resident,
            record_duration_ms,
            registry,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
