//! Idempotent guard configuration.

use serde::{Deserialize, Serialize};

/// Behaviour switches for an [`IdempotentGuard`](super::IdempotentGuard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotentGuardConfig {
    /// Add the key before forwarding instead of after success.
    ///
    /// Only eager guards deduplicate concurrent arrivals. A lazy guard checks
    /// with `contains` and commits later, so two workers can both see a key
    /// as new; it only guarantees deduplication for sequential arrivals.
    #[serde(default = "default_true")]
    pub eager: bool,
    /// Commit or roll back as soon as the wrapped stage calls back, instead
    /// of when the whole unit of work is done.
    #[serde(default)]
    pub completion_eager: bool,
    /// Do not forward recognised duplicates.
    #[serde(default = "default_true")]
    pub skip_duplicate: bool,
    /// Remove an eagerly added key when processing fails.
    #[serde(default = "default_true")]
    pub remove_on_failure: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IdempotentGuardConfig {
    fn default() -> Self {
        Self {
            eager: true,
            completion_eager: false,
            skip_duplicate: true,
            remove_on_failure: true,
        }
    }
}

impl IdempotentGuardConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets eager commit.
    #[must_use]
    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Sets eager completion.
    #[must_use]
    pub fn with_completion_eager(mut self, completion_eager: bool) -> Self {
        self.completion_eager = completion_eager;
        self
    }

    /// Sets duplicate skipping.
    #[must_use]
    pub fn with_skip_duplicate(mut self, skip_duplicate: bool) -> Self {
        self.skip_duplicate = skip_duplicate;
        self
    }

    /// Sets rollback on failure.
    #[must_use]
    pub fn with_remove_on_failure(mut self, remove_on_failure: bool) -> Self {
        self.remove_on_failure = remove_on_failure;
        self
    }
}
