//! Aggregate configuration loaded from JSON.

use crate::errors::RouteflowError;
use crate::idempotency::{IdempotentGuardConfig, MemoryRepositoryConfig};
use crate::observability::LoggingConfig;
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level configuration.
///
/// Every section is optional in JSON and falls back to its defaults.
///
/// ```rust
/// use routeflow::config::RouteflowConfig;
///
/// let config = RouteflowConfig::from_json_str(r#"{"scheduler": {"statistics_enabled": true}}"#).unwrap();
/// assert!(config.scheduler.statistics_enabled);
/// assert_eq!(config.repository.cache_size, 1000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteflowConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// In-memory repository settings.
    #[serde(default)]
    pub repository: MemoryRepositoryConfig,
    /// Default idempotent guard settings.
    #[serde(default)]
    pub guard: IdempotentGuardConfig,
}

impl RouteflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, RouteflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RouteflowError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading routeflow configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), RouteflowError> {
        self.scheduler.validate()?;
        self.logging.validate()?;
        self.repository.validate()?;
        Ok(())
    }

    /// Serializes to pretty JSON.
    pub fn to_json_string(&self) -> Result<String, RouteflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
