//! Connection pool and factory.
//!
//! The pool owns every resident connection of one capture source. The map
//! lock is held only for lookup, insert and removal; segment handling runs
//! under the connection's own lock. Timeouts are evaluated against capture
//! time, so a replayed capture always produces the same records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flowkeep_config::AssemblerConfig;
use flowkeep_telemetry::MetricsRecorder;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::blob::BlobStore;
use crate::connection::{Connection, Disposition, Pipeline};
use crate::flow::{ConnectionKey, Segment};
use crate::inflight::InFlight;
use crate::lifecycle::Lifecycle;
use crate::record::RecordBuilder;
use crate::sink::RecordSink;

pub struct ConnectionPool {
    connections: RwLock<HashMap<ConnectionKey, Arc<Connection>>>,
    pipeline: Pipeline,
    inflight: Arc<InFlight>,
    source: Arc<str>,
    next_id: AtomicU64,
    watermark: AtomicU64,
}

impl ConnectionPool {
    pub fn new(
        config: AssemblerConfig,
        blobs: Arc<dyn BlobStore>,
        sink: Arc<dyn RecordSink>,
        metrics: Arc<MetricsRecorder>,
        source: impl Into<Arc<str>>,
    ) -> Self {
        let inflight = Arc::new(InFlight::default());
        let pipeline = Pipeline {
            builder: RecordBuilder::new(
                config.max_inline_bytes,
                blobs,
                inflight.clone(),
                metrics.clone(),
            ),
            lifecycle: Lifecycle::new(sink, inflight.clone(), metrics.clone()),
            metrics,
            config,
        };
        Self {
            connections: RwLock::new(HashMap::new()),
            pipeline,
            inflight,
            source: source.into(),
            next_id: AtomicU64::new(0),
            watermark: AtomicU64::new(0),
        }
    }

    /// Find or create the connection `segment` belongs to.
    pub fn route(&self, segment: &Segment) -> Arc<Connection> {
        let key = segment.endpoints.key();
        if let Some(conn) = self.connections.read().get(&key) {
            return conn.clone();
        }

        let mut connections = self.connections.write();
        connections
            .entry(key)
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let conn = Connection::new(id, segment, self.source.clone(), &self.pipeline.config);
                self.pipeline.metrics.connections_created.inc();
                self.pipeline.metrics.connections_resident.inc();
                debug!(connection = %conn.endpoints(), id, "New connection");
                Arc::new(conn)
            })
            .clone()
    }

    /// Run one segment through its connection.
    #[instrument(level = "trace", skip_all, fields(seq = segment.seq))]
    pub fn process(&self, segment: Segment) {
        self.pipeline.metrics.segments.inc();
        self.watermark.fetch_max(segment.timestamp, Ordering::Relaxed);

        loop {
            let conn = self.route(&segment);
            match conn.handle_segment(&segment, &self.pipeline) {
                Disposition::Keep => return,
                Disposition::Evict => {
                    self.remove_if_same(&conn);
                    return;
                }
                // Raced with an eviction: retry on a fresh connection.
                Disposition::Stale => {
                    self.remove_if_same(&conn);
                }
            }
        }
    }

    /// Apply the pending and closing timeouts at capture time `now`.
    /// Returns the number of connections evicted.
    #[instrument(skip(self), fields(source = %self.source))]
    pub fn sweep(&self, now: u64) -> usize {
        let mut evicted = 0;
        for conn in self.snapshot() {
            match conn.sweep(now, &self.pipeline) {
                Disposition::Keep => {}
                Disposition::Evict | Disposition::Stale => {
                    if self.remove_if_same(&conn) {
                        evicted += 1;
                    }
                }
            }
        }
        if evicted > 0 {
            debug!(evicted, resident = self.len(), "Sweep finished");
        }
        evicted
    }

    /// Complete and evict every connection, at the end of a capture batch.
    #[instrument(skip(self), fields(source = %self.source))]
    pub fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for conn in self.snapshot() {
            conn.flush_and_complete(&self.pipeline);
            if self.remove_if_same(&conn) {
                flushed += 1;
            }
        }
        info!(flushed, "Flushed all connections");
        flushed
    }

    /// Block until every blob write and record delivery has finished.
    pub fn drain(&self) {
        self.inflight.wait_idle();
    }

    /// Latest capture timestamp seen (ns).
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.pipeline.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.pipeline.metrics
    }

    /// Resident connections in creation order.
    fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self.connections.read().values().cloned().collect();
        connections.sort_by_key(|conn| conn.id());
        connections
    }

    /// Remove `conn` unless its key already maps to a newer connection.
    fn remove_if_same(&self, conn: &Arc<Connection>) -> bool {
        let mut connections = self.connections.write();
        match connections.get(&conn.key()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                connections.remove(&conn.key());
                self.pipeline.metrics.connections_evicted.inc();
                self.pipeline.metrics.connections_resident.dec();
                true
            }
            _ => false,
        }
    }
}
