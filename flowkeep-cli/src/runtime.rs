//! Batch replay.
//!
//! Each trace file is one capture batch with its own pool. Ingestion runs
//! on a blocking task and sweeps the pool whenever the capture-time
//! watermark crosses a sweep interval boundary, so a trace always yields the
//! same records. At the end of the batch every connection is flushed and
//! in-flight writes are drained.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flowkeep_config::AssemblerConfig;
use flowkeep_core::blob::BlobStore;
use flowkeep_core::sink::RecordSink;
use flowkeep_core::ConnectionPool;
use flowkeep_telemetry::{EventLogger, MetricsRecorder};
use tracing::{debug, info, instrument, warn};

use crate::error::{CliError, TraceError};
use crate::trace::TraceReader;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub segments: u64,
    pub malformed: u64,
    pub flushed: usize,
}

/// Name recorded in each record's `filename`.
fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[instrument(level = "info", skip_all, fields(trace = %path.display()))]
pub async fn replay_batch(
    path: &Path,
    config: &AssemblerConfig,
    blobs: Arc<dyn BlobStore>,
    sink: Arc<dyn RecordSink>,
    metrics: Arc<MetricsRecorder>,
) -> Result<BatchSummary, CliError> {
    let trace_error = |source: TraceError| CliError::Trace {
        path: path.display().to_string(),
        source,
    };
    let reader = TraceReader::open(path).map_err(trace_error)?;
    let source = source_name(path);
    let pool = Arc::new(ConnectionPool::new(
        config.clone(),
        blobs,
        sink,
        metrics,
        source.as_str(),
    ));
    info!(source = %source, "Replaying capture batch");

    let ingest_pool = pool.clone();
    let sweep_interval = config.sweep_interval;
    let ingested =
        tokio::task::spawn_blocking(move || ingest(reader, &ingest_pool, sweep_interval)).await?;

    let mut summary = ingested.map_err(trace_error)?;
    summary.flushed = tokio::task::spawn_blocking(move || {
        let flushed = pool.flush_all();
        pool.drain();
        flushed
    })
    .await?;

    EventLogger::log_event(
        "batch_complete",
        &[
            ("source", source),
            ("segments", summary.segments.to_string()),
            ("malformed", summary.malformed.to_string()),
            ("flushed", summary.flushed.to_string()),
        ],
    );
    Ok(summary)
}

fn ingest<R: std::io::BufRead>(
    reader: TraceReader<R>,
    pool: &ConnectionPool,
    sweep_interval: Duration,
) -> Result<BatchSummary, TraceError> {
    let period = (sweep_interval.as_nanos() as u64).max(1);
    let mut epoch = None;
    let mut summary = BatchSummary::default();
    for item in reader {
        match item {
            Ok(segment) => {
                pool.process(segment);
                summary.segments += 1;

                let now = pool.watermark();
                let current = now / period;
                match epoch {
                    Some(previous) if current > previous => {
                        let evicted = pool.sweep(now);
                        debug!(evicted, now, "Periodic sweep");
                        epoch = Some(current);
                    }
                    Some(_) => {}
                    None => epoch = Some(current),
                }
            }
            Err(TraceError::Malformed { line, reason }) => {
                warn!(line, reason = %reason, "Skipping malformed trace line");
                summary.malformed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}
