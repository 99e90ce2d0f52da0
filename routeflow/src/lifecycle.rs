//! Start/stop lifecycle for long-lived components.

use crate::errors::RouteflowError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A component with an explicit start/stop lifecycle.
pub trait Service: Send + Sync {
    /// Returns the service name, unique within a registry.
    fn name(&self) -> &str;

    /// Starts the service.
    fn start(&self) -> Result<(), RouteflowError>;

    /// Stops the service, releasing its resources.
    fn stop(&self) -> Result<(), RouteflowError>;
}

/// Registry of started services, keyed by name.
///
/// Used by guards to avoid starting the same repository twice and by hosts to
/// stop everything on shutdown.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service unless one with the same name is present.
    ///
    /// Returns true if the service was added.
    pub fn register(&self, service: Arc<dyn Service>) -> bool {
        let name = service.name().to_string();
        let mut services = self.services.write();
        if services.contains_key(&name) {
            return false;
        }
        debug!(service = %name, "Registered service");
        services.insert(name, service);
        true
    }

    /// Registers and starts a service if it is not already present.
    ///
    /// Returns false without starting anything if the name is taken. A service
    /// that fails to start is not kept.
    pub fn start_service(&self, service: Arc<dyn Service>) -> Result<bool, RouteflowError> {
        if !self.register(service.clone()) {
            return Ok(false);
        }
        if let Err(e) = service.start() {
            self.services.write().remove(service.name());
            return Err(e);
        }
        Ok(true)
    }

    /// Returns true if a service with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Removes a service without stopping it.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.write().remove(name)
    }

    /// Lists registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Stops and removes every service.
    ///
    /// Failures are logged and do not prevent the remaining services from
    /// stopping. Returns the number of services that failed.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(String, Arc<dyn Service>)> = self.services.write().drain().collect();
        let mut failures = 0;
        for (name, service) in drained {
            if let Err(e) = service.stop() {
                failures += 1;
                warn!(service = %name, error = %e, "Failed to stop service");
            } else {
                debug!(service = %name, "Stopped service");
            }
        }
        failures
    }
}
