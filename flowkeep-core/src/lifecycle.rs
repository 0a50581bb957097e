//! Completion decisions.
//!
//! A connection completes on teardown (both halves closed by FIN, or a
//! reset) or when it has been idle for the pending timeout. Completion
//! turns the draft into a [`FlowEntry`] and hands it to the sink at most
//! once. Connections without any data are dropped. Completed connections
//! stay resident so trailing control segments still reach the state
//! machine; the pool evicts them later.

use std::sync::Arc;

use flowkeep_telemetry::MetricsRecorder;
use tracing::{debug, info, warn};

use crate::connection::FlowState;
use crate::inflight::InFlight;
use crate::record::{FlowEntry, Origin, RecordBuilder};
use crate::sink::RecordSink;

/// Result of [`Lifecycle::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No data: nothing emitted.
    Discarded,
    Emitted,
    /// An earlier completion already emitted the record.
    AlreadyEmitted,
}

impl Completion {
    /// Whether the connection should leave the pool right away.
    pub fn evict_now(&self) -> bool {
        matches!(self, Completion::Discarded)
    }
}

pub(crate) struct Lifecycle {
    sink: Arc<dyn RecordSink>,
    inflight: Arc<InFlight>,
    metrics: Arc<MetricsRecorder>,
}

impl Lifecycle {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        inflight: Arc<InFlight>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            sink,
            inflight,
            metrics,
        }
    }

    pub fn on_segment_accepted(state: &mut FlowState, timestamp: u64) {
        state.last_activity = state.last_activity.max(timestamp);
    }

    /// Both halves closed, or a reset. Returns whether to evict now.
    pub fn on_teardown_signal(&self, state: &mut FlowState, origin: &Origin) -> bool {
        self.complete(state, origin).evict_now()
    }

    /// The connection went quiet. Stalled data in either direction is
    /// released first, then the connection completes. Returns whether to
    /// evict now.
    pub fn on_idle_timeout(
        &self,
        state: &mut FlowState,
        origin: &Origin,
        builder: &RecordBuilder,
    ) -> bool {
        if !state.finishing {
            state.flush_buffers(None, builder, origin);
        }
        self.complete(state, origin).evict_now()
    }

    pub fn complete(&self, state: &mut FlowState, origin: &Origin) -> Completion {
        if state.emitted {
            return Completion::AlreadyEmitted;
        }
        state.finishing = true;

        let Some((first, last)) = state.draft.time_span() else {
            self.metrics.connections_discarded.inc();
            debug!(connection = %origin.endpoints, "Connection without data discarded");
            return Completion::Discarded;
        };

        let duration = (last - first).max(0);
        let record = FlowEntry {
            src_port: origin.endpoints.src.port(),
            dst_port: origin.endpoints.dst.port(),
            src_ip: origin.endpoints.src.ip().to_string(),
            dst_ip: origin.endpoints.dst.ip().to_string(),
            time: first,
            duration,
            inx: 0,
            starred: false,
            blocked: false,
            tags: Vec::new(),
            suricata: Vec::new(),
            filename: origin.source.to_string(),
            flow: state.draft.take_chunks(),
            anomalous: state.fsm.is_anomalous(),
        };
        state.emitted = true;

        let chunks = record.flow.len();
        let _tracked = self.inflight.track();
        match self.sink.emit(record) {
            Ok(()) => {
                self.metrics.records_emitted.inc();
                self.metrics.record_duration_ms.observe(duration as f64);
                info!(connection = %origin.endpoints, chunks, duration, "Record emitted");
            }
            Err(e) => {
                self.metrics.sink_failures.inc();
                warn!(error = %e, connection = %origin.endpoints, "Record sink failed");
            }
        }
        Completion::Emitted
    }
}
