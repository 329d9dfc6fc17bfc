//! Engine configuration.
//!
//! Loaded from a YAML file with kebab-case keys. Every field has a default,
//! so an empty file (or no file) yields [`EngineConfig::default`].
//!
//! ```yaml
//! traversal:
//!   max-depth: 20
//! dependencies:
//!   min-lag-days: -365
//!   max-lag-days: 365
//! schedule:
//!   slack-tolerance-days: 0.01
//! scheduler:
//!   master-aggregation-interval-secs: 1800
//!   program-metrics-interval-secs: 1200
//!   violation-scan-interval-secs: 3600
//!   portfolio-cache-interval-secs: 900
//!   cache-ttl-secs: 1800
//! health:
//!   history-len: 5
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Default hop bound for every reachability walk
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Default lag bounds in days
pub const DEFAULT_LAG_BOUND: i32 = 365;

/// Default CPM slack tolerance in days
pub const DEFAULT_SLACK_TOLERANCE: f64 = 0.01;

/// Default number of historical scores used for trend classification
pub const DEFAULT_HISTORY_LEN: usize = 5;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Traversal bounds
    pub traversal: TraversalConfig,

    /// Dependency validation bounds
    pub dependencies: DependencyConfig,

    /// Critical path settings
    pub schedule: ScheduleConfig,

    /// Background job cadences
    pub scheduler: SchedulerConfig,

    /// Health scoring settings
    pub health: HealthConfig,
}

/// Traversal bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TraversalConfig {
    /// Maximum hops for ancestor, descendant and reachability walks
    pub max_depth: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Dependency validation bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DependencyConfig {
    /// Smallest accepted lag
    pub min_lag_days: i32,

    /// Largest accepted lag
    pub max_lag_days: i32,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            min_lag_days: -DEFAULT_LAG_BOUND,
            max_lag_days: DEFAULT_LAG_BOUND,
        }
    }
}

/// Critical path settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Slack at or below this value marks a node critical
    pub slack_tolerance_days: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slack_tolerance_days: DEFAULT_SLACK_TOLERANCE,
        }
    }
}

/// Background job cadences, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Master aggregation cadence
    pub master_aggregation_interval_secs: u64,

    /// Program metrics cadence
    pub program_metrics_interval_secs: u64,

    /// Dependency violation scan cadence
    pub violation_scan_interval_secs: u64,

    /// Portfolio health cache cadence
    pub portfolio_cache_interval_secs: u64,

    /// Lifetime of cached results
    pub cache_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            master_aggregation_interval_secs: 30 * 60,
            program_metrics_interval_secs: 20 * 60,
            violation_scan_interval_secs: 60 * 60,
            portfolio_cache_interval_secs: 15 * 60,
            cache_ttl_secs: 30 * 60,
        }
    }
}

impl SchedulerConfig {
    /// Cache lifetime as a chrono duration
    #[must_use]
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX))
    }

    /// Master aggregation cadence
    #[must_use]
    pub fn master_aggregation_interval(&self) -> Duration {
        Duration::from_secs(self.master_aggregation_interval_secs)
    }

    /// Program metrics cadence
    #[must_use]
    pub fn program_metrics_interval(&self) -> Duration {
        Duration::from_secs(self.program_metrics_interval_secs)
    }

    /// Violation scan cadence
    #[must_use]
    pub fn violation_scan_interval(&self) -> Duration {
        Duration::from_secs(self.violation_scan_interval_secs)
    }

    /// Portfolio cache cadence
    #[must_use]
    pub fn portfolio_cache_interval(&self) -> Duration {
        Duration::from_secs(self.portfolio_cache_interval_secs)
    }
}

/// Health scoring settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Number of recent scores kept per node for trend classification
    pub history_len: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it cannot be parsed or holds out-of-range values.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on parse failure or invalid values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if serialization fails and `Error::Io` if the
    /// file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.traversal.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "traversal.max-depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dependencies.min_lag_days > self.dependencies.max_lag_days {
            return Err(ConfigError::InvalidValue {
                field: "dependencies.min-lag-days",
                reason: format!(
                    "{} exceeds max-lag-days {}",
                    self.dependencies.min_lag_days, self.dependencies.max_lag_days
                ),
            });
        }
        if !(self.schedule.slack_tolerance_days >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "schedule.slack-tolerance-days",
                reason: "must be a non-negative number".to_string(),
            });
        }
        let intervals = [
            (
                "scheduler.master-aggregation-interval-secs",
                self.scheduler.master_aggregation_interval_secs,
            ),
            (
                "scheduler.program-metrics-interval-secs",
                self.scheduler.program_metrics_interval_secs,
            ),
            (
                "scheduler.violation-scan-interval-secs",
                self.scheduler.violation_scan_interval_secs,
            ),
            (
                "scheduler.portfolio-cache-interval-secs",
                self.scheduler.portfolio_cache_interval_secs,
            ),
        ];
        for (field, secs) in intervals {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "interval must be at least one second".to_string(),
                });
            }
        }
        if self.health.history_len < 2 {
            return Err(ConfigError::InvalidValue {
                field: "health.history-len",
                reason: "trend needs at least two scores".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.traversal.max_depth, 20);
        assert_eq!(config.dependencies.min_lag_days, -365);
        assert_eq!(config.dependencies.max_lag_days, 365);
        assert_eq!(config.scheduler.master_aggregation_interval_secs, 1800);
        assert_eq!(config.scheduler.program_metrics_interval_secs, 1200);
        assert_eq!(config.scheduler.violation_scan_interval_secs, 3600);
        assert_eq!(config.scheduler.portfolio_cache_interval_secs, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = EngineConfig::from_yaml("traversal:\n  max-depth: 8\n").unwrap();
        assert_eq!(config.traversal.max_depth, 8);
        assert_eq!(config.health.history_len, DEFAULT_HISTORY_LEN);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml("  \n").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = EngineConfig::from_yaml("traversal:\n  max-depth: 0\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue {
                field: "traversal.max-depth",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_lag_range() {
        let yaml = "dependencies:\n  min-lag-days: 10\n  max-lag-days: 5\n";
        assert!(EngineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        let err = EngineConfig::from_yaml("traversal: [1, 2").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trellis.yaml");

        let mut config = EngineConfig::default();
        config.scheduler.cache_ttl_secs = 60;
        config.save(&path).await.unwrap();

        let loaded = EngineConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
