//! Completion hooks registered on a unit of work.

use super::UnitOfWork;
use std::fmt::Debug;

/// A hook fired exactly once when a unit of work finishes.
///
/// Exactly one of the two methods is invoked, depending on whether the unit
/// of work ended with an error.
pub trait Synchronization: Send + Sync + Debug {
    /// Called when the unit of work completed without error.
    fn on_complete(&self, uow: &UnitOfWork);

    /// Called when the unit of work completed with an error.
    fn on_failure(&self, uow: &UnitOfWork);
}

type HookFn = Box<dyn Fn(&UnitOfWork) + Send + Sync>;

/// A closure-based synchronization.
pub struct OnCompletion {
    name: String,
    on_complete: Option<HookFn>,
    on_failure: Option<HookFn>,
}

impl OnCompletion {
    /// Creates an empty hook with a name used in logs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_complete: None,
            on_failure: None,
        }
    }

    /// Sets the success callback.
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&UnitOfWork) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Sets the failure callback.
    #[must_use]
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&UnitOfWork) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }
}

impl Debug for OnCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnCompletion")
            .field("name", &self.name)
            .finish()
    }
}

impl Synchronization for OnCompletion {
    fn on_complete(&self, uow: &UnitOfWork) {
        if let Some(ref f) = self.on_complete {
            f(uow);
        }
    }

    fn on_failure(&self, uow: &UnitOfWork) {
        if let Some(ref f) = self.on_failure {
            f(uow);
        }
    }
}
