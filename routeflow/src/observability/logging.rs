//! Subscriber setup and per-unit-of-work spans.

use crate::errors::RouteflowError;
use crate::exchange::UnitOfWork;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `routeflow=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Validates the filter directive.
    pub fn validate(&self) -> Result<(), RouteflowError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| RouteflowError::config(format!("invalid log level '{}': {e}", self.level)))
    }
}

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` overrides the configured level. Fails instead of panicking if a
/// global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), RouteflowError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| RouteflowError::config(format!("invalid log level '{}': {e}", config.level)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| RouteflowError::Internal(format!("failed to install tracing subscriber: {e}")))
}

/// Creates a span carrying the unit of work's identity.
#[must_use]
pub fn uow_span(route: &str, uow: &UnitOfWork) -> tracing::Span {
    tracing::debug_span!(
        "uow",
        route = %route,
        uow_id = %uow.id(),
        transacted = uow.is_transacted()
    )
}
