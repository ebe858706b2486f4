//! Engine configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::expansion::DEFAULT_MAX_DEPTH;

/// Default cluster delimiter used by the function bridge.
pub const DEFAULT_CLUSTER_DELIMITER: &str = "|||";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every field may be omitted in a config file.
///
/// ```ron
/// (timeout_ms: 2000, failure_threshold: 5)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-geist wall-clock timeout.
    pub timeout_ms: u64,
    /// Consecutive failures before a geist is disabled.
    pub failure_threshold: u32,
    pub max_depth: usize,
    pub cluster_delimiter: String,
    /// Suggestions per grammar geist when its file does not say.
    pub default_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            failure_threshold: 3,
            max_depth: DEFAULT_MAX_DEPTH,
            cluster_delimiter: DEFAULT_CLUSTER_DELIMITER.to_string(),
            default_count: 1,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure_threshold must be at least 1".into()));
        }
        if self.cluster_delimiter.is_empty() {
            return Err(ConfigError::Invalid("cluster_delimiter must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
