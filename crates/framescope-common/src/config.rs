//! Configuration for profiler construction.
//!
//! Supports TOML deserialization with sensible defaults, so hosts can ship
//! a config file that turns instrumentation on or off without recompiling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level profiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Whether instrumentation is active. A disabled profiler turns every
    /// operation into a cheap no-op and never allocates a block.
    pub enabled: bool,

    /// Clock backend used for timestamps.
    pub clock: ClockSource,

    /// Divergence between the high-resolution counter and the coarse tick
    /// counter beyond which the raw-counter backend resynchronizes its
    /// reference point.
    #[serde(with = "humantime_serde")]
    pub drift_threshold: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clock: ClockSource::Std,
            drift_threshold: Duration::from_millis(100),
        }
    }
}

/// Clock backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// OS-monotonic `std::time::Instant`. Drift-free by contract.
    #[default]
    Std,
    /// High-resolution raw counter, resynchronized against the coarse tick
    /// counter when the two diverge.
    RawCounter,
}

impl ProfilerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProfilerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.clock, ClockSource::Std);
        assert_eq!(config.drift_threshold, Duration::from_millis(100));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            enabled = false
            clock = "raw_counter"
            drift_threshold = "250ms"
        "#;

        let config = ProfilerConfig::from_toml(toml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.clock, ClockSource::RawCounter);
        assert_eq!(config.drift_threshold, Duration::from_millis(250));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ProfilerConfig::from_toml("enabled = false").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.clock, ClockSource::Std);
        assert_eq!(config.drift_threshold, Duration::from_millis(100));
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = ProfilerConfig {
            enabled: true,
            clock: ClockSource::RawCounter,
            drift_threshold: Duration::from_millis(50),
        };
        let toml = config.to_toml().unwrap();
        let parsed = ProfilerConfig::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_unknown_clock_rejected() {
        let result = ProfilerConfig::from_toml(r#"clock = "sundial""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_humantime_duration_in_output() {
        let toml = ProfilerConfig::default().to_toml().unwrap();
        assert!(toml.contains("100ms"), "unexpected TOML: {toml}");
    }
}
