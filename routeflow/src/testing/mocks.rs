//! Mock stages and repositories for testing.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{RepositoryError, RouteflowError};
use crate::exchange::UnitOfWork;
use crate::idempotency::{IdempotentRepository, MemoryIdempotentRepository};
use crate::scheduler::{Continuation, TrampolineScheduler};
use crate::stages::{DoneCallback, Stage};

/// A synchronous stage that records every unit of work it sees.
///
/// It can be told to fail the next call, or every call.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    seen: Mutex<Vec<Uuid>>,
    fail_next: Mutex<Option<String>>,
    fail_always: Mutex<Option<String>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            fail_always: Mutex::new(None),
        }
    }

    /// Fails the next call with a downstream error.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Fails every call with a downstream error.
    pub fn fail_always(&self, message: impl Into<String>) {
        *self.fail_always.lock() = Some(message.into());
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns the ids of the units of work seen, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.seen.lock().clear();
    }
}

impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        self.seen.lock().push(uow.id());
        let failure = self
            .fail_next
            .lock()
            .take()
            .or_else(|| self.fail_always.lock().clone());
        if let Some(message) = failure {
            uow.set_error(RouteflowError::downstream(message));
        }
        on_done(true);
        true
    }
}

/// A stage that always fails synchronously.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        uow.set_error(RouteflowError::downstream(self.error.clone()));
        on_done(true);
        true
    }
}

/// A stage that completes asynchronously through the scheduler.
///
/// `process` queues the completion with `schedule_continue` and returns
/// false. Inside a running loop the completion runs after the work already
/// queued; on an idle thread it runs before `process` returns.
#[derive(Debug)]
pub struct DeferredStage {
    name: String,
    scheduler: Arc<TrampolineScheduler>,
    calls: AtomicUsize,
    error: Option<String>,
}

impl DeferredStage {
    /// Creates a new deferred stage.
    #[must_use]
    pub fn new(name: impl Into<String>, scheduler: Arc<TrampolineScheduler>) -> Self {
        Self {
            name: name.into(),
            scheduler,
            calls: AtomicUsize::new(0),
            error: None,
        }
    }

    /// Makes the deferred completion record a downstream error.
    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Stage for DeferredStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let uow = uow.clone();
        let error = self.error.clone();
        self.scheduler.schedule_continue(
            Continuation::new(move || {
                if let Some(message) = error {
                    uow.set_error(RouteflowError::downstream(message));
                }
                on_done(false);
            })
            .named(format!("{}:complete", self.name)),
        );
        false
    }
}

/// An in-memory repository that counts calls per operation.
#[derive(Debug, Default)]
pub struct CountingRepository {
    inner: MemoryIdempotentRepository,
    adds: AtomicUsize,
    contains: AtomicUsize,
    removes: AtomicUsize,
    confirms: AtomicUsize,
}

impl CountingRepository {
    /// Creates a new counting repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of `add` calls.
    #[must_use]
    pub fn add_calls(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    /// Returns the number of `contains` calls.
    #[must_use]
    pub fn contains_calls(&self) -> usize {
        self.contains.load(Ordering::SeqCst)
    }

    /// Returns the number of `remove` calls.
    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Returns the number of `confirm` calls.
    #[must_use]
    pub fn confirm_calls(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }
}

impl IdempotentRepository for CountingRepository {
    fn name(&self) -> &str {
        "counting-repository"
    }

    fn add(&self, key: &str) -> Result<bool, RepositoryError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add(key)
    }

    fn contains(&self, key: &str) -> Result<bool, RepositoryError> {
        self.contains.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(key)
    }

    fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key)
    }

    fn confirm(&self, key: &str) -> Result<bool, RepositoryError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        self.inner.confirm(key)
    }

    fn clear(&self) -> Result<(), RepositoryError> {
        self.inner.clear()
    }
}
