//! Per-connection state.
//!
//! Everything mutable about a connection sits behind one mutex, so work on
//! one connection never blocks another and sweeps wait for an in-progress
//! segment to finish.

use std::sync::Arc;

use flowkeep_config::AssemblerConfig;
use flowkeep_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::flow::{to_millis, ConnectionKey, Direction, EndpointPair, Segment};
use crate::lifecycle::Lifecycle;
use crate::reassembly::{BufferStats, ReassemblyBuffer, Released};
use crate::record::{Origin, RecordBuilder, RecordDraft};
use crate::state::{HandshakeState, StateMachine};

/// Collaborators shared by every connection of a pool.
pub(crate) struct Pipeline {
    pub config: AssemblerConfig,
    pub builder: RecordBuilder,
    pub lifecycle: Lifecycle,
    pub metrics: Arc<MetricsRecorder>,
}

/// Outcome of handing a segment or a sweep to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// The connection stays resident.
    Keep,
    /// The connection has just been marked evicted; remove it from the pool.
    Evict,
    /// The connection was evicted earlier; the segment was not processed.
    Stale,
}

pub(crate) struct FlowState {
    pub fsm: StateMachine,
    /// Indexed by [`Direction::index`].
    pub buffers: [ReassemblyBuffer; 2],
    pub draft: RecordDraft,
    /// Latest capture time of an accepted segment.
    pub last_activity: u64,
    /// Completion has started; payload is no longer reassembled.
    pub finishing: bool,
    pub emitted: bool,
    pub evicted: bool,
    /// Buffer statistics already reported to metrics.
    reported: BufferStats,
}

impl FlowState {
    pub fn new(strict: bool, max_buffered_bytes: usize, created_at: u64) -> Self {
        Self {
            fsm: StateMachine::new(strict),
            buffers: [
                ReassemblyBuffer::new(max_buffered_bytes),
                ReassemblyBuffer::new(max_buffered_bytes),
            ],
            draft: RecordDraft::new(),
            last_activity: created_at,
            finishing: false,
            emitted: false,
            evicted: false,
            reported: BufferStats::default(),
        }
    }

    /// Force-release both directions and append the runs in capture order.
    /// With a cutoff only directions holding data older than it are flushed.
    pub fn flush_buffers(&mut self, cutoff: Option<u64>, builder: &RecordBuilder, origin: &Origin) {
        let mut runs: Vec<(Direction, Released)> = Vec::new();
        for direction in [Direction::ClientToServer, Direction::ServerToClient] {
            let buffer = &mut self.buffers[direction.index()];
            let released = match cutoff {
                Some(cutoff) => buffer.force_flush_older_than(cutoff),
                None => buffer.force_flush(),
            };
            runs.extend(released.into_iter().map(|run| (direction, run)));
        }
        runs.sort_by_key(|(_, run)| run.timestamp);

        for (direction, run) in runs {
            builder.append(&mut self.draft, direction, &run.data, run.timestamp, origin);
        }
    }

    fn both_halves_closed(&self) -> bool {
        self.buffers.iter().all(ReassemblyBuffer::is_closed)
    }

    fn report_buffer_stats(&mut self, metrics: &MetricsRecorder) {
        let [a, b] = &self.buffers;
        let (a, b) = (a.stats(), b.stats());
        let duplicates = a.duplicates + b.duplicates;
        let gaps = a.gaps_skipped + b.gaps_skipped;

        metrics
            .duplicate_segments
            .inc_by(duplicates - self.reported.duplicates);
        metrics.gaps_skipped.inc_by(gaps - self.reported.gaps_skipped);
        self.reported.duplicates = duplicates;
        self.reported.gaps_skipped = gaps;
    }
}

pub struct Connection {
    id: u64,
    key: ConnectionKey,
    origin: Origin,
    state: Mutex<FlowState>,
}

impl Connection {
    /// Create the connection for `first`. Its sender is the client, unless
    /// `first` is a SYN+ACK, whose receiver is.
    pub(crate) fn new(id: u64, first: &Segment, source: Arc<str>, config: &AssemblerConfig) -> Self {
        let endpoints = if first.flags.syn && first.flags.ack {
            first.endpoints.reversed()
        } else {
            first.endpoints
        };
        Self {
            id,
            key: endpoints.key(),
            origin: Origin { endpoints, source },
            state: Mutex::new(FlowState::new(
                config.is_strict(),
                config.max_buffered_bytes,
                first.timestamp,
            )),
        }
    }

    /// Creation order within the pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Client to server.
    pub fn endpoints(&self) -> EndpointPair {
        self.origin.endpoints
    }

    pub fn source(&self) -> &str {
        &self.origin.source
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.state.lock().fsm.state()
    }

    pub fn is_emitted(&self) -> bool {
        self.state.lock().emitted
    }

    pub fn is_evicted(&self) -> bool {
        self.state.lock().evicted
    }

    /// Chunks gathered so far and not yet emitted.
    pub fn pending_chunks(&self) -> usize {
        self.state.lock().draft.chunks().len()
    }

    pub fn direction_of(&self, endpoints: &EndpointPair) -> Direction {
        if *endpoints == self.origin.endpoints {
            Direction::ClientToServer
        } else {
            Direction::ServerToClient
        }
    }

    pub(crate) fn handle_segment(&self, segment: &Segment, pipeline: &Pipeline) -> Disposition {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.evicted {
            return Disposition::Stale;
        }

        let metrics = &pipeline.metrics;
        let direction = self.direction_of(&segment.endpoints);
        let verdict = state.fsm.evaluate(segment.flags, direction);
        if verdict.anomaly {
            metrics.protocol_anomalies.inc();
            debug!(
                connection = %self.key,
                direction = direction.as_tag(),
                state = state.fsm.state().as_str(),
                "Out-of-state segment"
            );
        }
        if !verdict.accepted {
            metrics.segments_rejected.inc();
            trace!(connection = %self.key, seq = segment.seq, "Segment rejected");
            return Disposition::Keep;
        }

        Lifecycle::on_segment_accepted(state, segment.timestamp);

        if state.finishing {
            if !segment.payload.is_empty() {
                metrics.segments_late.inc();
                debug!(connection = %self.key, len = segment.payload.len(), "Late segment after completion");
            }
            return Disposition::Keep;
        }

        let buffer = &mut state.buffers[direction.index()];
        let mut seq = segment.seq;
        if segment.flags.syn {
            buffer.set_initial_seq(seq);
            seq = seq.wrapping_add(1);
        }
        let released = buffer.submit(seq, segment.payload.clone(), segment.flags.fin, segment.timestamp);
        for run in &released {
            trace!(
                connection = %self.key,
                direction = direction.as_tag(),
                len = run.data.len(),
                time = to_millis(run.timestamp),
                "Range released"
            );
            pipeline
                .builder
                .append(&mut state.draft, direction, &run.data, run.timestamp, &self.origin);
        }

        let disposition = if segment.flags.rst {
            state.flush_buffers(None, &pipeline.builder, &self.origin);
            self.teardown(state, pipeline)
        } else if state.both_halves_closed() {
            self.teardown(state, pipeline)
        } else {
            Disposition::Keep
        };
        state.report_buffer_stats(metrics);
        disposition
    }

    /// Apply the pool's timeouts at capture time `now`.
    pub(crate) fn sweep(&self, now: u64, pipeline: &Pipeline) -> Disposition {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.evicted {
            return Disposition::Stale;
        }

        let config = &pipeline.config;
        let idle = now.saturating_sub(state.last_activity);
        let disposition = if idle >= config.close_timeout.as_nanos() as u64 {
            debug!(connection = %self.key, idle_ms = idle / 1_000_000, "Closing timeout");
            self.finish(state, pipeline)
        } else if idle >= config.pending_timeout.as_nanos() as u64 && !state.finishing {
            debug!(connection = %self.key, idle_ms = idle / 1_000_000, "Pending timeout");
            if pipeline
                .lifecycle
                .on_idle_timeout(state, &self.origin, &pipeline.builder)
            {
                state.evicted = true;
                Disposition::Evict
            } else {
                Disposition::Keep
            }
        } else {
            if !state.finishing {
                let cutoff = now.saturating_sub(config.pending_timeout.as_nanos() as u64);
                state.flush_buffers(Some(cutoff), &pipeline.builder, &self.origin);
            }
            Disposition::Keep
        };
        state.report_buffer_stats(&pipeline.metrics);
        disposition
    }

    /// Complete if still needed, then mark evicted.
    pub(crate) fn flush_and_complete(&self, pipeline: &Pipeline) -> Disposition {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.evicted {
            return Disposition::Stale;
        }
        let disposition = self.finish(state, pipeline);
        state.report_buffer_stats(&pipeline.metrics);
        disposition
    }

    fn teardown(&self, state: &mut FlowState, pipeline: &Pipeline) -> Disposition {
        if pipeline.lifecycle.on_teardown_signal(state, &self.origin) {
            state.evicted = true;
            Disposition::Evict
        } else {
            Disposition::Keep
        }
    }

    fn finish(&self, state: &mut FlowState, pipeline: &Pipeline) -> Disposition {
        if !state.finishing {
            state.flush_buffers(None, &pipeline.builder, &self.origin);
        }
        pipeline.lifecycle.complete(state, &self.origin);
        state.evicted = true;
        Disposition::Evict
    }
}
