//! config.rs
//! Tunables for graph compilation, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid compiler configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid compiler configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Requirements nested deeper than this fail as recursive.
    pub max_resolution_depth: usize,
    /// Pause before retrying tasks whose lookups would have blocked.
    pub blocked_retry_backoff_ms: u64,
    /// Build configurations concurrently on the rayon pool.
    pub parallel_configurations: bool,
    /// Run the structural validator over each compiled graph.
    pub validate_graphs: bool,
    /// Emit one warning per distinct failure after each build.
    pub log_failures: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_resolution_depth: 64,
            blocked_retry_backoff_ms: 10,
            parallel_configurations: true,
            validate_graphs: false,
            log_failures: true,
        }
    }
}

impl CompilerConfig {
    /// Parses a JSON object. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn blocked_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.blocked_retry_backoff_ms)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_resolution_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = CompilerConfig::from_json_str(r#"{ "validate_graphs": true }"#).unwrap();
        assert!(config.validate_graphs);
        assert_eq!(config.max_resolution_depth, 64);
        assert_eq!(config.blocked_retry_backoff(), Duration::from_millis(10));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = CompilerConfig::from_json_str(r#"{ "max_resolution_depth": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_resolution_depth", .. }));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(CompilerConfig::from_json_str("{ nope"), Err(ConfigError::Parse(_))));
    }
}
