//! JSON-lines record output.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use flowkeep_core::error::SinkError;
use flowkeep_core::record::FlowEntry;
use flowkeep_core::sink::RecordSink;
use parking_lot::Mutex;

use crate::error::StorageError;

/// Writes one JSON document per record and line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
    written: AtomicU64,
}

impl JsonLinesSink<File> {
    /// Append to `path`, creating it if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            written: AtomicU64::new(0),
        }
    }

    pub fn write_record(&self, record: &FlowEntry) -> Result<(), StorageError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.writer.lock().flush()?;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> Result<W, StorageError> {
        self.writer
            .into_inner()
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn emit(&self, record: FlowEntry) -> Result<(), SinkError> {
        self.write_record(&record).map_err(SinkError::from)
    }
}
