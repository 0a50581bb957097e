//! Custom validation functions for configuration.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

use crate::AssemblerConfig;

lazy_static! {
    static ref LOG_LEVEL: Regex =
        Regex::new("^(?i)(trace|debug|info|warn|error|off)$").expect("static regex");
}

/// Timeouts must be non-zero and `close_timeout >= pending_timeout`.
pub fn validate_timeouts(config: &AssemblerConfig) -> Result<(), ValidationError> {
    if config.pending_timeout.is_zero() || config.close_timeout.is_zero() {
        return Err(ValidationError::new("zero_timeout"));
    }
    if config.close_timeout < config.pending_timeout {
        let mut err = ValidationError::new("close_before_pending");
        err.message = Some("close_timeout must be >= pending_timeout".into());
        return Err(err);
    }
    if config.sweep_interval.is_zero() {
        return Err(ValidationError::new("zero_sweep_interval"));
    }
    Ok(())
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVEL.is_match(level) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
