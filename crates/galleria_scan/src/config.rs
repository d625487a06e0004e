//! Configuration for the scan controller

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the scan controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanControllerConfig {
    /// Coalescing window for relaxed scan scheduling, in milliseconds
    #[serde(default = "default_relaxed_delay_ms")]
    pub relaxed_delay_ms: u64,

    /// Coalescing window for externally triggered scans, in milliseconds
    #[serde(default = "default_external_delay_ms")]
    pub external_delay_ms: u64,

    /// Idle time after which unconsumed hints are dropped, in seconds
    #[serde(default = "default_hint_quiescence_secs")]
    pub hint_quiescence_secs: u64,

    /// Name of the worker thread
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,
}

fn default_relaxed_delay_ms() -> u64 {
    500
}

fn default_external_delay_ms() -> u64 {
    1500
}

fn default_hint_quiescence_secs() -> u64 {
    5 * 60
}

fn default_worker_thread_name() -> String {
    "scan-controller".to_string()
}

impl Default for ScanControllerConfig {
    fn default() -> Self {
        Self {
            relaxed_delay_ms: default_relaxed_delay_ms(),
            external_delay_ms: default_external_delay_ms(),
            hint_quiescence_secs: default_hint_quiescence_secs(),
            worker_thread_name: default_worker_thread_name(),
        }
    }
}

impl ScanControllerConfig {
    pub fn relaxed_delay(&self) -> Duration {
        Duration::from_millis(self.relaxed_delay_ms)
    }

    pub fn external_delay(&self) -> Duration {
        Duration::from_millis(self.external_delay_ms)
    }

    pub fn hint_quiescence(&self) -> Duration {
        Duration::from_secs(self.hint_quiescence_secs)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanControllerConfig =
            toml::from_str(&content).map_err(|e| ScanError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanControllerConfig::default();
        assert_eq!(config.relaxed_delay(), Duration::from_millis(500));
        assert_eq!(config.external_delay(), Duration::from_millis(1500));
        assert_eq!(config.hint_quiescence(), Duration::from_secs(300));
        assert_eq!(config.worker_thread_name, "scan-controller");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ScanControllerConfig = toml::from_str("relaxed_delay_ms = 50\n").unwrap();
        assert_eq!(config.relaxed_delay_ms, 50);
        assert_eq!(config.external_delay_ms, 1500);
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("scan.toml");
        let config = ScanControllerConfig {
            relaxed_delay_ms: 10,
            external_delay_ms: 20,
            hint_quiescence_secs: 1,
            worker_thread_name: "worker".to_string(),
        };

        config.save(&path).unwrap();
        let loaded = ScanControllerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("scan.toml");
        std::fs::write(&path, "relaxed_delay_ms = \"soon\"").unwrap();

        let err = ScanControllerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
