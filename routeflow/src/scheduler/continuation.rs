//! Deferred units of work handed to the scheduler.

use std::fmt::Debug;

type TaskFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A zero-argument unit of deferred work, consumed exactly once.
pub struct Continuation {
    name: Option<String>,
    task: TaskFn,
}

impl Continuation {
    /// Creates a continuation from an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: None,
            task: Box::new(move || {
                f();
                Ok(())
            }),
        }
    }

    /// Creates a continuation whose error is reported to the run loop.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: None,
            task: Box::new(f),
        }
    }

    /// Names the continuation for logging.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Runs the continuation.
    pub fn run(self) -> anyhow::Result<()> {
        (self.task)()
    }
}

impl Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
