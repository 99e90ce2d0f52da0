//! Bridge from async work on a tokio runtime back onto the trampoline.

use super::{DoneCallback, Stage};
use crate::errors::RouteflowError;
use crate::exchange::UnitOfWork;
use crate::scheduler::{Continuation, TrampolineScheduler};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::trace;

/// Asynchronous work performed by an [`AsyncStage`].
#[async_trait]
pub trait AsyncWork: Send + Sync + Debug {
    /// Runs the work for one unit of work.
    async fn run(&self, uow: Arc<UnitOfWork>) -> Result<(), RouteflowError>;
}

/// A stage that completes asynchronously.
///
/// The work is spawned on a tokio runtime. When it finishes, the result is
/// recorded and `on_done(false)` is scheduled with `schedule_continue` on the
/// thread that observed completion.
#[derive(Debug)]
pub struct AsyncStage {
    name: String,
    work: Arc<dyn AsyncWork>,
    scheduler: Arc<TrampolineScheduler>,
    handle: Handle,
}

impl AsyncStage {
    /// Creates a stage that spawns onto the given runtime.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        work: Arc<dyn AsyncWork>,
        scheduler: Arc<TrampolineScheduler>,
        handle: Handle,
    ) -> Self {
        Self {
            name: name.into(),
            work,
            scheduler,
            handle,
        }
    }

    /// Creates a stage bound to the runtime of the calling context.
    pub fn on_current_runtime(
        name: impl Into<String>,
        work: Arc<dyn AsyncWork>,
        scheduler: Arc<TrampolineScheduler>,
    ) -> Result<Self, RouteflowError> {
        let handle = Handle::try_current()
            .map_err(|e| RouteflowError::Internal(format!("no tokio runtime available: {e}")))?;
        Ok(Self::new(name, work, scheduler, handle))
    }
}

impl Stage for AsyncStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        let work = self.work.clone();
        let scheduler = self.scheduler.clone();
        let uow = uow.clone();
        let label = format!("{}:resume", self.name);

        trace!(stage = %self.name, uow_id = %uow.id(), "Spawning async work");
        self.handle.spawn(async move {
            let result = work.run(uow.clone()).await;
            scheduler.schedule_continue(
                Continuation::new(move || {
                    if let Err(e) = result {
                        uow.set_error(e);
                    }
                    on_done(false);
                })
                .named(label),
            );
        });
        false
    }
}
