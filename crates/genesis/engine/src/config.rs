//! Runtime configuration
//!
//! Layered as built-in defaults, then an optional file, then `GENESIS__*`
//! environment variables (`GENESIS__VESSEL__TIMEOUT_MS=500`).

use crate::potentiality::PotentialitySettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub vessel: VesselConfig,

    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Defaults for domains whose potentiality block omits a field
    #[serde(default)]
    pub potentiality: PotentialitySettings,

    #[serde(default)]
    pub reports: ReportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselConfig {
    /// Upper bound on any single vessel call
    #[serde(default = "default_vessel_timeout")]
    pub timeout_ms: u64,

    /// Interval of the fallback tick watch vessel
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Pause before polling again after a watch vessel fails
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for VesselConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_vessel_timeout(),
            tick_interval_ms: default_tick_interval(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl VesselConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Bound of the compliance channel; events beyond it are dropped
    #[serde(default = "default_compliance_capacity")]
    pub channel_capacity: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_compliance_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Cycle reports buffered per subscriber
    #[serde(default = "default_report_capacity")]
    pub channel_capacity: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_report_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_vessel_timeout() -> u64 {
    5_000
}

fn default_tick_interval() -> u64 {
    1_000
}

fn default_retry_backoff() -> u64 {
    1_000
}

fn default_compliance_capacity() -> usize {
    1024
}

fn default_report_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RuntimeConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&RuntimeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GENESIS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.vessel.timeout(), Duration::from_secs(5));
        assert_eq!(config.vessel.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.compliance.channel_capacity, 1024);
        assert_eq!(config.potentiality.window, 16);
        assert_eq!(config.potentiality.floor, 0.1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_matches_defaults() {
        let config = RuntimeConfig::load(None).unwrap();
        assert_eq!(config.vessel, VesselConfig::default());
        assert_eq!(config.potentiality, PotentialitySettings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.toml");
        std::fs::write(&path, "[vessel]\ntimeout_ms = 250\n\n[potentiality]\nfloor = 0.2\n").unwrap();

        let config = RuntimeConfig::load(path.to_str()).unwrap();
        assert_eq!(config.vessel.timeout_ms, 250);
        assert_eq!(config.vessel.tick_interval_ms, 1_000);
        assert_eq!(config.potentiality.floor, 0.2);
        assert_eq!(config.potentiality.decay, 0.5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(RuntimeConfig::load(Some("/definitely/not/here/genesis.toml")).is_err());
    }
}
