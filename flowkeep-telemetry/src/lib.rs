//! # flowkeep telemetry
//!
//! Logging and metrics shared by every flowkeep crate.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
