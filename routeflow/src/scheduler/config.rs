//! Scheduler configuration.

use crate::errors::RouteflowError;
use serde::{Deserialize, Serialize};

/// Configuration for the trampoline scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether worker and task counters are maintained.
    #[serde(default)]
    pub statistics_enabled: bool,
    /// Soft cap on the number of workers tracked for teardown.
    #[serde(default = "default_max_tracked_workers")]
    pub max_tracked_workers: usize,
}

fn default_max_tracked_workers() -> usize {
    1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            statistics_enabled: false,
            max_tracked_workers: default_max_tracked_workers(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables statistics.
    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    /// Sets the tracked worker cap.
    #[must_use]
    pub fn with_max_tracked_workers(mut self, max: usize) -> Self {
        self.max_tracked_workers = max;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), RouteflowError> {
        if self.max_tracked_workers == 0 {
            return Err(RouteflowError::config(
                "scheduler.max_tracked_workers must be greater than zero",
            ));
        }
        Ok(())
    }
}
