//! Error types for the routeflow core.
//!
//! The taxonomy separates failures that end a unit of work (missing identity,
//! repository access, downstream failure) from failures that the scheduler
//! isolates (continuation failure).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for routeflow operations.
#[derive(Debug, Error)]
pub enum RouteflowError {
    /// No idempotency key could be derived from a unit of work.
    #[error("{0}")]
    MissingIdentity(#[from] MissingIdentityError),

    /// The idempotency repository failed.
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// A downstream stage failed.
    #[error("Downstream failure: {0}")]
    Downstream(String),

    /// A scheduled continuation failed.
    #[error("Continuation '{task}' failed: {message}")]
    Continuation {
        /// Name of the continuation, or `<anonymous>`.
        task: String,
        /// The error or panic message.
        message: String,
    },

    /// A service failed to start or stop.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RouteflowError {
    /// Creates a downstream failure.
    #[must_use]
    pub fn downstream(message: impl Into<String>) -> Self {
        Self::Downstream(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the taxonomy bucket this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingIdentity(_) => ErrorCategory::MissingIdentity,
            Self::Repository(_) => ErrorCategory::RepositoryAccess,
            Self::Continuation { .. } => ErrorCategory::ContinuationFailure,
            Self::Downstream(_) => ErrorCategory::DownstreamFailure,
            _ => ErrorCategory::Other,
        }
    }

    /// Returns true for missing-identity failures.
    #[must_use]
    pub fn is_missing_identity(&self) -> bool {
        matches!(self, Self::MissingIdentity(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "category".to_string(),
            serde_json::to_value(self.category()).unwrap_or(serde_json::Value::Null),
        );
        map.insert("message".to_string(), serde_json::Value::String(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for RouteflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Key extraction failed; fatal for the unit of work.
    MissingIdentity,
    /// The idempotency store failed; fatal for the unit of work.
    RepositoryAccess,
    /// A scheduled task failed; isolated by the run loop.
    ContinuationFailure,
    /// The wrapped stage failed.
    DownstreamFailure,
    /// Anything else.
    Other,
}

/// Error raised when a key expression yields no key for a unit of work.
#[derive(Debug, Clone, Error)]
#[error("No message ID could be found using expression: {expression} on unit of work: {uow_id}{}", .cause.as_ref().map(|c| format!(" (caused by: {c})")).unwrap_or_default())]
pub struct MissingIdentityError {
    /// The unit of work that had no identity.
    pub uow_id: Uuid,
    /// Description of the key expression used.
    pub expression: String,
    /// The extraction failure, when the expression itself errored.
    pub cause: Option<String>,
}

impl MissingIdentityError {
    /// Creates a new missing identity error.
    #[must_use]
    pub fn new(uow_id: Uuid, expression: impl Into<String>) -> Self {
        Self {
            uow_id,
            expression: expression.into(),
            cause: None,
        }
    }

    /// Sets the underlying extraction failure.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Error raised by an idempotency repository.
#[derive(Debug, Clone, Error)]
#[error("Idempotent repository '{repository}' failed during {operation}{}: {message}", .key.as_ref().map(|k| format!(" of key '{k}'")).unwrap_or_default())]
pub struct RepositoryError {
    /// The repository name.
    pub repository: String,
    /// The operation that failed (`add`, `contains`, ...).
    pub operation: String,
    /// The key involved, if any.
    pub key: Option<String>,
    /// Failure description.
    pub message: String,
}

impl RepositoryError {
    /// Creates a new repository error.
    #[must_use]
    pub fn new(
        repository: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            operation: operation.into(),
            key: None,
            message: message.into(),
        }
    }

    /// Sets the key involved.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
