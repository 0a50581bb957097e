//! Destinations for completed records.

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::SinkError;
use crate::record::FlowEntry;

/// Receives each completed record exactly once.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: FlowEntry) -> Result<(), SinkError>;
}

impl<F> RecordSink for F
where
    F: Fn(FlowEntry) + Send + Sync,
{
    fn emit(&self, record: FlowEntry) -> Result<(), SinkError> {
        self(record);
        Ok(())
    }
}

/// Forwards records over a crossbeam channel to the persistence side.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<FlowEntry>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, Receiver<FlowEntry>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }

    /// A full channel blocks the emitting connection until there is room.
    pub fn bounded(capacity: usize) -> (Self, Receiver<FlowEntry>) {
        let (tx, rx) = channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: FlowEntry) -> Result<(), SinkError> {
        self.tx.send(record).map_err(|_| SinkError::Closed)
    }
}
