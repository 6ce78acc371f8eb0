//! Pipeline configuration.
//!
//! The request context carries the configuration through to every producer
//! without interpreting it. Only the entry point reads `prefetch_enabled`.

use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration shared by all requests of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of requests in flight at once.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Whether prefetch requests are executed at all.
    #[serde(default = "default_true")]
    pub prefetch_enabled: bool,
    /// Whether decoders may downsample to the requested size.
    #[serde(default)]
    pub downsample_enabled: bool,
    /// Whether progressive JPEG scans are surfaced as intermediate results.
    #[serde(default = "default_true")]
    pub progressive_rendering_enabled: bool,
    /// Event name reported to listeners when a cancellation callback panics.
    #[serde(default = "default_callback_fault_event_name")]
    pub callback_fault_event_name: String,
    /// Free-form experiment flags passed through to producers.
    #[serde(default)]
    pub experiments: HashMap<String, serde_json::Value>,
}

fn default_max_concurrent_requests() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_callback_fault_event_name() -> String {
    "cancellation_callback_failed".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            prefetch_enabled: true,
            downsample_enabled: false,
            progressive_rendering_enabled: true,
            callback_fault_event_name: default_callback_fault_event_name(),
            experiments: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_concurrent_requests == 0 {
            return Err(PipelineError::config("max_concurrent_requests must be at least 1"));
        }
        if self.callback_fault_event_name.trim().is_empty() {
            return Err(PipelineError::config("callback_fault_event_name must not be empty"));
        }
        Ok(())
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    /// Enables or disables prefetching.
    #[must_use]
    pub fn with_prefetch_enabled(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Enables or disables downsampling.
    #[must_use]
    pub fn with_downsample_enabled(mut self, enabled: bool) -> Self {
        self.downsample_enabled = enabled;
        self
    }

    /// Adds an experiment flag.
    #[must_use]
    pub fn with_experiment(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.experiments.insert(key.into(), value);
        self
    }

    /// Returns an experiment flag as a bool, `false` if absent.
    #[must_use]
    pub fn experiment_enabled(&self, key: &str) -> bool {
        self.experiments
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.max_concurrent_requests, 64);
        assert!(config.prefetch_enabled);
        assert!(!config.downsample_enabled);
        assert_eq!(config.callback_fault_event_name, "cancellation_callback_failed");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json_str(
            r#"{"prefetch_enabled": false, "experiments": {"fast_decode": true}}"#,
        )
        .unwrap();

        assert!(!config.prefetch_enabled);
        assert_eq!(config.max_concurrent_requests, 64);
        assert!(config.experiment_enabled("fast_decode"));
        assert!(!config.experiment_enabled("missing"));
    }

    #[test]
    fn test_from_json_invalid() {
        let err = PipelineConfig::from_json_str(r#"{"max_concurrent_requests": 0}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let err = PipelineConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"downsample_enabled": true}}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert!(config.downsample_enabled);
    }

    #[test]
    fn test_from_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/imagepipe.json").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::new()
            .with_max_concurrent_requests(4)
            .with_prefetch_enabled(false)
            .with_downsample_enabled(true)
            .with_experiment("x", serde_json::json!(true));

        assert_eq!(config.max_concurrent_requests, 4);
        assert!(!config.prefetch_enabled);
        assert!(config.downsample_enabled);
        assert!(config.experiment_enabled("x"));
    }
}
