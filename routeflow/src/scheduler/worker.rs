//! Per-thread scheduler state.

use super::{Continuation, SchedulerStatistics};
use crate::errors::RouteflowError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;
use tracing::{trace, warn};

#[derive(Debug, Default)]
struct WorkerState {
    /// Active frame, drained front to back.
    queue: VecDeque<Continuation>,
    /// Suspended frames, resumed last-in first-out.
    back: Vec<VecDeque<Continuation>>,
}

/// Scheduler state for one thread.
///
/// Only the owning thread ever touches a worker's queues. The mutex exists so
/// the worker can live in the scheduler's shared map; it is never contended
/// and never held while a continuation runs.
#[derive(Debug)]
pub struct Worker {
    number: u64,
    thread: ThreadId,
    state: Mutex<WorkerState>,
    running: AtomicBool,
}

impl Worker {
    pub(crate) fn new(number: u64, thread: ThreadId) -> Self {
        Self {
            number,
            thread,
            state: Mutex::new(WorkerState::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the worker's sequence number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Returns the thread owning this worker.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Returns true while a run loop is draining this worker.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the number of queued continuations across all frames.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.queue.len() + state.back.iter().map(VecDeque::len).sum::<usize>()
    }

    /// Returns the number of suspended frames.
    #[must_use]
    pub fn suspended_frames(&self) -> usize {
        self.state.lock().back.len()
    }

    /// Returns true if the worker is not running and holds no work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.is_running() && self.pending() == 0
    }

    /// Queues a continuation.
    ///
    /// With `nest`, a non-empty active frame is suspended first and the task
    /// lands in a fresh frame. With `front`, the task goes to the head of the
    /// active frame instead of its tail.
    pub(crate) fn push(&self, task: Continuation, front: bool, nest: bool) {
        let mut state = self.state.lock();
        if nest && !state.queue.is_empty() {
            let suspended = std::mem::take(&mut state.queue);
            state.back.push(suspended);
        }
        if front {
            state.queue.push_front(task);
        } else {
            state.queue.push_back(task);
        }
    }

    /// Sets the running flag, returning its previous value.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    /// Takes the next continuation, resuming suspended frames as needed.
    fn next(&self) -> Option<Continuation> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.queue.pop_front() {
                return Some(task);
            }
            match state.back.pop() {
                Some(resumed) => state.queue = resumed,
                None => return None,
            }
        }
    }

    /// Takes the head of the active frame only.
    pub(crate) fn pop_front(&self) -> Option<Continuation> {
        self.state.lock().queue.pop_front()
    }

    /// Drains every frame until no work remains.
    ///
    /// The caller owns the running flag; this only executes work.
    pub(crate) fn run_loop(&self, stats: &SchedulerStatistics) {
        stats.record_loop_entered();
        while let Some(task) = self.next() {
            stats.record_dequeued();
            self.run_isolated(task);
        }
        stats.record_loop_exited();
    }

    /// Runs one continuation, logging and swallowing any error or panic.
    pub(crate) fn run_isolated(&self, task: Continuation) {
        let name = task.name().unwrap_or("<anonymous>").to_string();
        trace!(worker = self.number, task = %name, "Running continuation");

        let message = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run())) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        let error = RouteflowError::Continuation {
            task: name,
            message,
        };
        warn!(
            worker = self.number,
            category = ?error.category(),
            error = %error,
            "Error executing continuation. This error is ignored."
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
