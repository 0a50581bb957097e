//! ## flowkeep-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! Installs a `tracing-subscriber` formatter whose filter comes from
//! `RUST_LOG` when set and from the configured level otherwise.

use tracing::info_span;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Install the global subscriber. Later calls are ignored so tests and
    /// embedding applications may call this freely.
    pub fn init(default_level: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let _ = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Emit a named operational event with key/value metadata inside its own span.
    pub fn log_event(event_type: &str, metadata: &[(&str, String)]) {
        let span = info_span!("flowkeep_event", event_type = event_type);
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "{}", event_type);
    }
}
