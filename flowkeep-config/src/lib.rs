//! # flowkeep configuration
//!
//! Hierarchical configuration for the flowkeep stream assembler.
//!
//! ## Sections
//! - `assembler`: handshake mode, timeouts and size bounds used by the core
//! - `storage`: where blobs and records are written
//! - `telemetry`: log level and metrics output
//!
//! Values are layered with `figment` (defaults, YAML file, `FLOWKEEP_*`
//! environment variables) and checked with `validator` before use.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod assembler;
mod error;
mod storage;
mod telemetry;
pub mod units;
mod validation;

pub use assembler::{AssemblerConfig, HandshakeMode};
pub use error::ConfigError;
pub use storage::StorageConfig;
pub use telemetry::TelemetryConfig;

/// Default location of the base configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/flowkeep.yaml";

/// Top‑level configuration container for all flowkeep components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct FlowkeepConfig {
    /// Reassembly and record construction parameters.
    #[serde(default)]
    #[validate(nested)]
    pub assembler: AssemblerConfig,

    /// Blob and record output locations.
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl FlowkeepConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/flowkeep.yaml`, if present
    /// 3. `config/<FLOWKEEP_ENV>.yaml`, if present
    /// 4. `FLOWKEEP_*` environment variables (`__` separates nested keys)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Self::defaults();

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        }

        if let Ok(env) = std::env::var("FLOWKEEP_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment.merge(Self::env()))
    }

    /// Load configuration from a specific file, layered over the defaults
    /// and under the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(Self::defaults().merge(Yaml::file(path)).merge(Self::env()))
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(FlowkeepConfig::default()))
    }

    fn env() -> Env {
        Env::prefixed("FLOWKEEP_").split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
