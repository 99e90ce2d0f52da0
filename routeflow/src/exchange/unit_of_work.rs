//! The unit of work: one message traversal through a pipeline.

use super::{Message, PropertyBag, Synchronization};
use crate::errors::RouteflowError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Property flagging a unit of work as a recognised duplicate.
pub const DUPLICATE_MESSAGE: &str = "RouteflowDuplicateMessage";

/// Property flagging a unit of work whose failure was consumed by an error handler.
pub const FAILURE_HANDLED: &str = "RouteflowFailureHandled";

#[derive(Debug, Default)]
struct HookState {
    hooks: Vec<Arc<dyn Synchronization>>,
    completed: bool,
}

/// One message traversal.
///
/// A unit of work is shared by reference (`Arc<UnitOfWork>`) between the
/// stage currently holding it and the completion hooks registered on it.
/// Every registered hook fires exactly once, on the success or the failure
/// branch, when [`UnitOfWork::done`] is called.
#[derive(Debug)]
pub struct UnitOfWork {
    id: Uuid,
    created_at: DateTime<Utc>,
    transacted: bool,
    input: RwLock<Message>,
    output: RwLock<Option<Message>>,
    error: RwLock<Option<Arc<RouteflowError>>>,
    properties: PropertyBag,
    hooks: Mutex<HookState>,
}

impl UnitOfWork {
    /// Creates a unit of work for an input message.
    #[must_use]
    pub fn new(input: Message) -> Self {
        Self::with_id(Uuid::new_v4(), input)
    }

    /// Creates a unit of work with a specific identity.
    #[must_use]
    pub fn with_id(id: Uuid, input: Message) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            transacted: false,
            input: RwLock::new(input),
            output: RwLock::new(None),
            error: RwLock::new(None),
            properties: PropertyBag::new(),
            hooks: Mutex::new(HookState::default()),
        }
    }

    /// Marks the unit of work as transacted; stages then continue it synchronously.
    #[must_use]
    pub fn transacted(mut self) -> Self {
        self.transacted = true;
        self
    }

    /// Returns the unique identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if the unit of work is transacted.
    #[must_use]
    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    /// Returns a copy of the input message.
    #[must_use]
    pub fn input(&self) -> Message {
        self.input.read().clone()
    }

    /// Reads an input header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<serde_json::Value> {
        self.input.read().get_header(name).cloned()
    }

    /// Reads the input message without copying it.
    pub fn with_input<R>(&self, f: impl FnOnce(&Message) -> R) -> R {
        f(&self.input.read())
    }

    /// Mutates the input message.
    pub fn update_input(&self, f: impl FnOnce(&mut Message)) {
        f(&mut self.input.write());
    }

    /// Returns a copy of the output message, if any.
    #[must_use]
    pub fn output(&self) -> Option<Message> {
        self.output.read().clone()
    }

    /// Sets the output message.
    pub fn set_output(&self, message: Message) {
        *self.output.write() = Some(message);
    }

    /// Returns the mutable property bag.
    #[must_use]
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Returns the recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<Arc<RouteflowError>> {
        self.error.read().clone()
    }

    /// Returns true if an error is recorded.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.read().is_some()
    }

    /// Records the terminal error.
    ///
    /// The first error wins; returns false if one was already recorded.
    pub fn set_error(&self, error: impl Into<RouteflowError>) -> bool {
        let mut slot = self.error.write();
        if slot.is_some() {
            let error = error.into();
            debug!(uow_id = %self.id, error = %error, "Error already recorded, ignoring");
            return false;
        }
        *slot = Some(Arc::new(error.into()));
        true
    }

    /// Consumes the recorded error on behalf of an error handler.
    ///
    /// The unit of work is no longer failed but keeps the `FAILURE_HANDLED`
    /// flag, so completion hooks can still tell that processing did not succeed.
    pub fn mark_failure_handled(&self) -> Option<Arc<RouteflowError>> {
        let taken = self.error.write().take();
        if taken.is_some() {
            self.properties.set(FAILURE_HANDLED, serde_json::Value::Bool(true));
        }
        taken
    }

    /// Returns true if an error handler consumed a failure.
    #[must_use]
    pub fn is_failure_handled(&self) -> bool {
        self.properties.flag(FAILURE_HANDLED)
    }

    /// Returns true if the unit of work was flagged as a duplicate.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.properties.flag(DUPLICATE_MESSAGE)
    }

    /// Registers a completion hook.
    ///
    /// A hook added after [`UnitOfWork::done`] has run fires immediately.
    pub fn add_on_completion(&self, hook: Arc<dyn Synchronization>) {
        {
            let mut state = self.hooks.lock();
            if !state.completed {
                state.hooks.push(hook);
                return;
            }
        }
        debug!(uow_id = %self.id, ?hook, "Unit of work already done, firing hook now");
        self.fire(&hook, self.is_failed());
    }

    /// Returns the number of hooks waiting for completion.
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.hooks.lock().hooks.len()
    }

    /// Returns true once [`UnitOfWork::done`] has run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.hooks.lock().completed
    }

    /// Finishes the unit of work and fires every registered hook once.
    ///
    /// Hooks fire in registration order. A panicking hook is logged and does
    /// not stop the others. Returns false if the unit of work was already done.
    pub fn done(&self) -> bool {
        let hooks = {
            let mut state = self.hooks.lock();
            if state.completed {
                return false;
            }
            state.completed = true;
            std::mem::take(&mut state.hooks)
        };

        let failed = self.is_failed();
        debug!(uow_id = %self.id, failed, hooks = hooks.len(), "Unit of work done");
        for hook in &hooks {
            self.fire(hook, failed);
        }
        true
    }

    fn fire(&self, hook: &Arc<dyn Synchronization>, failed: bool) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if failed {
                hook.on_failure(self);
            } else {
                hook.on_complete(self);
            }
        }));
        if let Err(panic) = result {
            warn!(uow_id = %self.id, ?hook, "Completion hook panicked: {:?}", panic);
        }
    }
}
