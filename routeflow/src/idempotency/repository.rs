//! Idempotent repository protocol and the in-memory implementation.

use crate::errors::{RepositoryError, RouteflowError};
use crate::lifecycle::Service;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Store of keys that have already been seen.
///
/// Implementations are shared across threads and must do their own locking.
/// `add` has to be a linearizable test-and-set for eager guards to provide
/// concurrent deduplication.
#[cfg_attr(test, mockall::automock)]
pub trait IdempotentRepository: Send + Sync + Debug {
    /// Returns the repository name, used for service registration and logs.
    fn name(&self) -> &str;

    /// Adds a key. Returns true if it was not present before.
    fn add(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Returns true if the key is present.
    fn contains(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Removes a key. Returns true if it was present.
    fn remove(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Confirms a key after successful processing.
    fn confirm(&self, _key: &str) -> Result<bool, RepositoryError> {
        Ok(true)
    }

    /// Removes every key.
    fn clear(&self) -> Result<(), RepositoryError>;

    /// Starts the repository.
    fn start(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Stops the repository.
    fn stop(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Configuration for [`MemoryIdempotentRepository`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRepositoryConfig {
    /// Maximum number of keys kept before the oldest is evicted.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_cache_size() -> usize {
    1000
}

impl Default for MemoryRepositoryConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
        }
    }
}

impl MemoryRepositoryConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache size.
    #[must_use]
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), RouteflowError> {
        if self.cache_size == 0 {
            return Err(RouteflowError::config(
                "repository.cache_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

/// Bounded in-memory repository.
///
/// Keeps at most `cache_size` keys and evicts the oldest insertion first.
/// All operations take a single lock, so `add` is a true test-and-set.
#[derive(Debug)]
pub struct MemoryIdempotentRepository {
    name: String,
    cache_size: usize,
    state: Mutex<MemoryState>,
}

impl Default for MemoryIdempotentRepository {
    fn default() -> Self {
        Self {
            name: "memory-idempotent-repository".to_string(),
            cache_size: default_cache_size(),
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl MemoryIdempotentRepository {
    /// Creates a repository with the default cache size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository from configuration.
    pub fn with_config(config: &MemoryRepositoryConfig) -> Result<Self, RouteflowError> {
        config.validate()?;
        Ok(Self {
            cache_size: config.cache_size,
            ..Self::default()
        })
    }

    /// Sets the repository name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the maximum number of keys kept.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Returns the number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Returns true if no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().keys.is_empty()
    }
}

impl IdempotentRepository for MemoryIdempotentRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, key: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if !state.keys.insert(key.to_string()) {
            return Ok(false);
        }
        state.order.push_back(key.to_string());
        while state.keys.len() > self.cache_size {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.keys.remove(&oldest);
            debug!(repository = %self.name, key = %oldest, "Evicted idempotency key");
        }
        Ok(true)
    }

    fn contains(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().keys.contains(key))
    }

    fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if !state.keys.remove(key) {
            return Ok(false);
        }
        state.order.retain(|k| k != key);
        Ok(true)
    }

    fn clear(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state.keys.clear();
        state.order.clear();
        Ok(())
    }

    fn stop(&self) -> Result<(), RepositoryError> {
        self.clear()
    }
}

/// Adapts a shared repository to the [`Service`] lifecycle.
#[derive(Debug, Clone)]
pub struct RepositoryService {
    repository: Arc<dyn IdempotentRepository>,
}

impl RepositoryService {
    /// Wraps a repository.
    #[must_use]
    pub fn new(repository: Arc<dyn IdempotentRepository>) -> Self {
        Self { repository }
    }

    /// Returns the wrapped repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn IdempotentRepository> {
        &self.repository
    }
}

impl Service for RepositoryService {
    fn name(&self) -> &str {
        self.repository.name()
    }

    fn start(&self) -> Result<(), RouteflowError> {
        self.repository.start().map_err(Into::into)
    }

    fn stop(&self) -> Result<(), RouteflowError> {
        self.repository.stop().map_err(Into::into)
    }
}
