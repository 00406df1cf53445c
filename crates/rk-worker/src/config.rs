//! Worker and dispatcher configuration
//!
//! Settings can be loaded from a RON file; any field left out falls back to
//! its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache entry count above which a run boundary clears the whole store
pub const DEFAULT_EVICTION_THRESHOLD: usize = 10_000;

/// Default name of the worker OS thread
pub const DEFAULT_THREAD_NAME: &str = "rk-kernel-worker";

/// Worker-side settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Entry count that triggers a full cache clear at the next run boundary
    pub eviction_threshold: usize,
    /// Whether the worker announces each call with a busy notification
    pub emit_busy: bool,
    /// Name given to the worker thread
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            emit_busy: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Caller-side settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Queue calls made before a worker is attached (otherwise fail with
    /// `NotReady`)
    pub queue_until_attached: bool,
    /// Give up on a call after this many milliseconds. `None` waits forever.
    pub call_timeout_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_until_attached: true,
            call_timeout_ms: None,
        }
    }
}

impl DispatcherConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    pub worker: WorkerConfig,
    pub dispatcher: DispatcherConfig,
}

impl RpcConfig {
    /// Load configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Parse configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Save configuration to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io(e.to_string()))
    }
}

/// Configuration-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}
