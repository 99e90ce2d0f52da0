//! Stage trait and implementations.
//!
//! Stages are the units a route is built from. Each one follows the same
//! completion protocol: `process` returns whether it finished synchronously,
//! and the `on_done` callback is invoked exactly once, either before
//! `process` returns or later from a scheduled continuation.

mod async_stage;
mod ext;
mod pipeline;

pub use async_stage::{AsyncStage, AsyncWork};
pub use ext::StageExt;
pub use pipeline::Pipeline;

use crate::errors::RouteflowError;
use crate::exchange::UnitOfWork;
use std::fmt::Debug;
use std::sync::Arc;

/// Completion callback handed to [`Stage::process`].
///
/// The argument is true if the stage completed synchronously.
pub type DoneCallback = Box<dyn FnOnce(bool) + Send>;

/// Trait for route stages.
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Processes a unit of work.
    ///
    /// Errors are recorded on the unit of work, not returned. `on_done` must
    /// be called exactly once. Returns true if the stage completed before
    /// returning.
    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool;
}

/// A simple function-based stage that always completes synchronously.
pub struct FnStage<F>
where
    F: Fn(&UnitOfWork) -> Result<(), RouteflowError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&UnitOfWork) -> Result<(), RouteflowError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&UnitOfWork) -> Result<(), RouteflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&UnitOfWork) -> Result<(), RouteflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        if let Err(e) = (self.func)(uow) {
            uow.set_error(e);
        }
        on_done(true);
        true
    }
}

/// A stage that does nothing and completes synchronously.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, _uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        on_done(true);
        true
    }
}
