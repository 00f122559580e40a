//! Runtime configuration.
//!
//! Operational knobs for the router: attempt bound, timeouts, cache and
//! learning-loop sizing, alert suppression and circuit breaking. Durations
//! are written human-readably (`"30s"`, `"24h"`) and parsed with `humantime`.
//!
//! The routing policy (pricing, limits, thresholds) is a separate document
//! owned by `tollgate-core`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::PolicyError;

use crate::resilience::CircuitBreakerConfig;

/// Errors from loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Backend registration failed: {0}")]
    Backend(String),
}

/// Serde helper for `humantime` durations.
pub(crate) mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

/// Response cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub default_ttl: Duration,

    #[serde(with = "duration_str")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// Learning loop sizing and tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningConfig {
    /// Ring buffer capacity (most recent attempts kept)
    pub capacity: usize,

    /// Attempts needed before recommendations are made
    pub min_samples: usize,

    /// How often the periodic task emits recommendations
    #[serde(with = "duration_str")]
    pub interval: Duration,

    /// Quality score at or above which an attempt counts as a success
    pub success_threshold: f64,

    /// Apply premium-threshold recommendations automatically
    pub auto_tune: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            min_samples: 20,
            interval: Duration::from_secs(15 * 60),
            success_threshold: 0.8,
            auto_tune: false,
        }
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    /// Repeat alerts of the same level and month inside this window are dropped
    #[serde(with = "duration_str")]
    pub suppression_window: Duration,

    /// Retries for a failing notifier
    pub notify_retries: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            suppression_window: Duration::from_secs(3600),
            notify_retries: 3,
        }
    }
}

/// Runtime configuration for the router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Backend invocations per task, hard bound
    pub max_attempts: u32,

    /// Timeout for each backend invocation
    #[serde(with = "duration_str")]
    pub backend_timeout: Duration,

    /// Timeout for each grounding verification call
    #[serde(with = "duration_str")]
    pub verification_timeout: Duration,

    /// Sampling temperature passed to backends
    pub temperature: f32,

    pub cache: CacheConfig,
    pub learning: LearningConfig,
    pub alerts: AlertConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backend_timeout: Duration::from_secs(30),
            verification_timeout: Duration::from_secs(5),
            temperature: 0.7,
            cache: CacheConfig::default(),
            learning: LearningConfig::default(),
            alerts: AlertConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Range checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.backend_timeout.is_zero() || self.verification_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.learning.capacity == 0 {
            return Err(ConfigError::Invalid("learning.capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.learning.success_threshold) {
            return Err(ConfigError::Invalid(
                "learning.success_threshold must be within [0, 1]".into(),
            ));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.default_ttl must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(86_400));
        assert_eq!(config.alerts.suppression_window, Duration::from_secs(3600));
        assert!(!config.learning.auto_tune);
        config.validate().unwrap();
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = r#"
backend_timeout: 45s
cache:
  default_ttl: 2h 30m
learning:
  interval: 5m
  auto_tune: true
circuit_breaker:
  failure_threshold: 5
  recovery_timeout: 1m
  success_threshold: 1
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.backend_timeout, Duration::from_secs(45));
        assert_eq!(config.cache.default_ttl, Duration::from_secs(9000));
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.learning.interval, Duration::from_secs(300));
        assert!(config.learning.auto_tune);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_json_round_trip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"30s\""));
        assert_eq!(RuntimeConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_duration() {
        assert!(matches!(
            RuntimeConfig::from_yaml("backend_timeout: soon"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(matches!(
            RuntimeConfig::from_yaml("max_attempts: 0"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
