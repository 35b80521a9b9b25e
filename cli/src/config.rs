//! CLI configuration file.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use chainbatch_core::BatchConfig;
use chainbatch_http::HttpClientConfig;

use crate::logging::LogConfig;

/// Contents of the `--config` JSON file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load from `path` if given, else defaults.
    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(Path::new(p)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbatch_core::FailureMode;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: CliConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch, BatchConfig::default());
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn partial_sections() {
        let config: CliConfig = serde_json::from_str(
            r#"{"batch": {"batch_window_ms": 10, "failure_mode": "report"}, "log": {"json": true}}"#,
        )
        .unwrap();
        assert_eq!(config.batch.batch_window_ms, 10);
        assert_eq!(config.batch.request_timeout_ms, 30_000);
        assert_eq!(config.batch.failure_mode, FailureMode::Report);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = CliConfig::load_or_default(Some("/nonexistent/chainbatch.json")).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
