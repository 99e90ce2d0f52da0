//! Route ingress: drives one unit of work through a stage and finishes it.

use crate::errors::RouteflowError;
use crate::exchange::UnitOfWork;
use crate::observability::uow_span;
use crate::scheduler::{Continuation, TrampolineScheduler};
use crate::stages::Stage;
use futures::channel::oneshot;
use std::sync::Arc;
use tracing::trace;

/// Entry point that feeds units of work into a stage.
///
/// Each submission opens a new scheduler frame. When the stage reports
/// completion the unit of work is marked done, which fires its completion
/// hooks exactly once, and then the caller's callback runs.
#[derive(Debug, Clone)]
pub struct Route {
    id: String,
    scheduler: Arc<TrampolineScheduler>,
    stage: Arc<dyn Stage>,
}

impl Route {
    /// Creates a route.
    #[must_use]
    pub fn new(id: impl Into<String>, scheduler: Arc<TrampolineScheduler>, stage: Arc<dyn Stage>) -> Self {
        Self {
            id: id.into(),
            scheduler,
            stage,
        }
    }

    /// Returns the route id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<TrampolineScheduler> {
        &self.scheduler
    }

    /// Submits a unit of work.
    ///
    /// `on_complete` runs after every completion hook has fired. If the
    /// calling thread is idle everything that completes synchronously has
    /// finished by the time this returns.
    pub fn submit<F>(&self, uow: Arc<UnitOfWork>, on_complete: F)
    where
        F: FnOnce(&Arc<UnitOfWork>) + Send + 'static,
    {
        let stage = self.stage.clone();
        let route = self.id.clone();
        let task = Continuation::new(move || {
            let span = uow_span(&route, &uow);
            let _entered = span.enter();
            let finished = uow.clone();
            stage.process(
                &uow,
                Box::new(move |sync| {
                    trace!(route = %route, uow_id = %finished.id(), sync, failed = finished.is_failed(), "Route completed");
                    finished.done();
                    on_complete(&finished);
                }),
            );
        })
        .named(format!("{}:submit", self.id));

        self.scheduler.schedule_start(task);
    }

    /// Submits a unit of work and waits for it to finish.
    ///
    /// Resolves to the same unit of work. Processing errors are recorded on
    /// it; the returned error only signals that the stage never completed.
    pub async fn send(&self, uow: Arc<UnitOfWork>) -> Result<Arc<UnitOfWork>, RouteflowError> {
        let (tx, rx) = oneshot::channel();
        let id = uow.id();
        self.submit(uow, move |finished| {
            let _ = tx.send(finished.clone());
        });
        rx.await.map_err(|_| {
            RouteflowError::Internal(format!(
                "route '{}' dropped unit of work {id} before completion",
                self.id
            ))
        })
    }
}
