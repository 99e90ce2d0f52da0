//! Future-returning adapter over the callback protocol.

use super::Stage;
use crate::errors::RouteflowError;
use crate::exchange::UnitOfWork;
use async_trait::async_trait;
use futures::channel::oneshot;
use std::sync::Arc;

/// Extension methods available on every [`Stage`].
#[async_trait]
pub trait StageExt: Stage {
    /// Processes a unit of work and resolves once `on_done` has been called.
    ///
    /// Resolves to the flag the stage passed to `on_done`. Fails if the stage
    /// dropped its callback without calling it.
    async fn process_async(&self, uow: Arc<UnitOfWork>) -> Result<bool, RouteflowError>;
}

#[async_trait]
impl<S: Stage + ?Sized> StageExt for S {
    async fn process_async(&self, uow: Arc<UnitOfWork>) -> Result<bool, RouteflowError> {
        let (tx, rx) = oneshot::channel();
        self.process(
            &uow,
            Box::new(move |sync| {
                // The receiver may already be gone if the caller stopped waiting.
                let _ = tx.send(sync);
            }),
        );
        rx.await.map_err(|_| {
            RouteflowError::Internal(format!(
                "stage '{}' dropped its completion callback for unit of work {}",
                self.name(),
                uow.id()
            ))
        })
    }
}
