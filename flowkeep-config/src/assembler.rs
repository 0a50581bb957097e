//! Stream assembler parameters.
//!
//! Controls how the core tracks connections:
//! - Handshake strictness
//! - Pending-data and closing timeouts (measured in capture time)
//! - Inline record cap and reassembly buffer bound

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::{units, validation};

/// How the state machine treats connections observed without their setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeMode {
    /// Connections first seen mid-stream are tracked but never reassembled,
    /// and out-of-state segments are rejected.
    Strict,
    /// Missing setup is tolerated; out-of-state segments are only flagged.
    #[default]
    Lenient,
}

/// Stream assembler configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_timeouts))]
pub struct AssemblerConfig {
    /// Strict or lenient handshake tracking.
    #[serde(default)]
    pub handshake: HandshakeMode,

    /// Idle time after which buffered data is force-released and the
    /// connection completed.
    #[serde(default = "default_pending_timeout", with = "units::duration")]
    pub pending_timeout: Duration,

    /// Idle time after which a connection is evicted regardless of state.
    #[serde(default = "default_close_timeout", with = "units::duration")]
    pub close_timeout: Duration,

    /// Inline payload cap per connection (bytes).
    #[validate(range(min = 1, max = 1073741824))]
    #[serde(
        default = "default_max_inline_bytes",
        deserialize_with = "units::deserialize_size"
    )]
    pub max_inline_bytes: usize,

    /// Out-of-order bytes a single direction may hold before it is
    /// force-released.
    #[validate(range(min = 1024, max = 1073741824))]
    #[serde(
        default = "default_max_buffered_bytes",
        deserialize_with = "units::deserialize_size"
    )]
    pub max_buffered_bytes: usize,

    /// Capture-time period between sweeps.
    #[serde(default = "default_sweep_interval", with = "units::duration")]
    pub sweep_interval: Duration,
}

fn default_pending_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_close_timeout() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_max_inline_bytes() -> usize {
    15_000_000 // Keeps a record under the 16MB document limit.
}

fn default_max_buffered_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(1)
}

impl AssemblerConfig {
    pub fn is_strict(&self) -> bool {
        self.handshake == HandshakeMode::Strict
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeMode::default(),
            pending_timeout: default_pending_timeout(),
            close_timeout: default_close_timeout(),
            max_inline_bytes: default_max_inline_bytes(),
            max_buffered_bytes: default_max_buffered_bytes(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_inline_cap() {
        let config = AssemblerConfig {
            max_inline_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = AssemblerConfig {
            pending_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn strict_mode_flag() {
        let config = AssemblerConfig {
            handshake: HandshakeMode::Strict,
            ..Default::default()
        };
        assert!(config.is_strict());
        assert!(!AssemblerConfig::default().is_strict());
    }
}
