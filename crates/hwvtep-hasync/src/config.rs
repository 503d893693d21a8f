//! Configuration file support for the HWVTEP HA synchronizer
//!
//! Loads and validates configuration from TOML files.
//! Default location: /etc/sonic/hwvtep-hasync.conf

use serde::{Deserialize, Serialize};
use sonic_ha_common::{HaError, HaResult};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::delete_guard::MAX_TTL;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/hwvtep-hasync.conf";

/// Delete-race guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteGuardConfig {
    /// Seconds an in-flight delete marker stays live without a completion
    #[serde(default = "default_guard_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of in-flight delete markers
    #[serde(default = "default_guard_capacity")]
    pub capacity: usize,
}

/// Merge behaviour configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Create missing ancestors when writing a propagated record
    #[serde(default = "default_create_parents")]
    pub create_parents: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

/// Complete synchronizer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaSyncConfig {
    #[serde(default)]
    pub delete_guard: DeleteGuardConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_guard_ttl() -> u64 {
    300
}

fn default_guard_capacity() -> usize {
    10_000
}

fn default_create_parents() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeleteGuardConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_guard_ttl(),
            capacity: default_guard_capacity(),
        }
    }
}

impl DeleteGuardConfig {
    /// Marker TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            create_parents: default_create_parents(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl HaSyncConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> HaResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                HaError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(HaError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> HaResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> HaResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HaError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Delete marker TTL as Duration
    pub fn delete_guard_ttl(&self) -> Duration {
        self.delete_guard.ttl()
    }

    /// Validate configuration
    pub fn validate(&self) -> HaResult<()> {
        if self.delete_guard.ttl_secs == 0 {
            return Err(HaError::Config(
                "delete_guard.ttl_secs must be > 0".to_string(),
            ));
        }

        if self.delete_guard.ttl_secs > MAX_TTL.as_secs() {
            return Err(HaError::Config(format!(
                "delete_guard.ttl_secs must be <= {}",
                MAX_TTL.as_secs()
            )));
        }

        if self.delete_guard.capacity == 0 {
            return Err(HaError::Config(
                "delete_guard.capacity must be > 0".to_string(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(HaError::Config("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}
