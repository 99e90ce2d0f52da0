//! The trampoline scheduler.

use super::{Continuation, SchedulerConfig, SchedulerStatistics, Worker};
use crate::errors::RouteflowError;
use crate::lifecycle::Service;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, trace, warn};

/// Cooperative executor that runs continuations without growing the stack.
///
/// Workers are created lazily, one per calling thread, and kept in a map
/// owned by the scheduler so that [`TrampolineScheduler::shutdown`] can drop
/// every thread's state, including threads belonging to long-lived external
/// pools.
///
/// # Example
///
/// ```rust
/// use routeflow::scheduler::{Continuation, TrampolineScheduler};
/// use std::sync::Arc;
///
/// let scheduler = Arc::new(TrampolineScheduler::new());
/// let inner = scheduler.clone();
/// scheduler.schedule_continue(Continuation::new(move || {
///     // queued behind the current task instead of recursing
///     inner.schedule_continue(Continuation::new(|| {}));
/// }));
/// ```
#[derive(Debug)]
pub struct TrampolineScheduler {
    config: SchedulerConfig,
    workers: DashMap<ThreadId, Arc<Worker>>,
    next_worker: AtomicU64,
    stats: SchedulerStatistics,
}

impl Default for TrampolineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TrampolineScheduler {
    /// Creates a scheduler with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with the given configuration.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            stats: SchedulerStatistics::new(config.statistics_enabled),
            config,
            workers: DashMap::new(),
            next_worker: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the activity counters.
    #[must_use]
    pub fn statistics(&self) -> &SchedulerStatistics {
        &self.stats
    }

    /// Appends a continuation to the current frame.
    ///
    /// Starts the run loop if this thread's worker is idle; otherwise the
    /// continuation runs after everything already queued in the frame.
    pub fn schedule_continue(&self, task: Continuation) {
        self.schedule(task, false, false, false);
    }

    /// Opens a new frame holding `task`.
    ///
    /// A non-empty active frame is suspended and resumes only after the new
    /// frame, including everything it schedules, has fully drained.
    pub fn schedule_start(&self, task: Continuation) {
        self.schedule(task, true, true, false);
    }

    /// Puts `task` at the head of the current frame and drains it now.
    ///
    /// Runs a nested loop even when one is already active on this thread.
    pub fn schedule_immediate(&self, task: Continuation) {
        self.schedule(task, true, false, true);
    }

    /// Appends a continuation without starting the run loop.
    pub fn enqueue_only(&self, task: Continuation) {
        self.with_worker(|worker| worker.push(task, false, false));
        self.stats.record_enqueued();
    }

    /// Runs the head of the current frame, if any.
    ///
    /// Returns whether a continuation ran. Work scheduled by that continuation
    /// stays queued for later calls.
    pub fn run_one_from_queue(&self) -> bool {
        let (worker, task, was_running) = self.with_worker(|worker| {
            let was_running = worker.set_running(true);
            (worker.clone(), worker.pop_front(), was_running)
        });

        let ran = match task {
            Some(task) => {
                self.stats.record_dequeued();
                worker.run_isolated(task);
                true
            }
            None => false,
        };
        worker.set_running(was_running);
        ran
    }

    /// Returns the number of workers currently tracked.
    #[must_use]
    pub fn tracked_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns the calling thread's worker, if one exists.
    #[must_use]
    pub fn current_worker(&self) -> Option<Arc<Worker>> {
        self.workers
            .get(&std::thread::current().id())
            .map(|w| w.value().clone())
    }

    /// Returns the number of continuations queued on the calling thread.
    #[must_use]
    pub fn pending_on_current_thread(&self) -> usize {
        self.current_worker().map_or(0, |w| w.pending())
    }

    /// Drops every tracked worker.
    ///
    /// Threads that schedule again afterwards get a fresh worker. A loop that
    /// is draining at the time of the call finishes with the worker it holds.
    /// Work queued on idle workers is discarded and no longer counted as
    /// pending.
    pub fn shutdown(&self) -> usize {
        if self.stats.is_enabled() {
            let snapshot = self.stats.snapshot();
            debug!(
                created_workers = snapshot.created_workers,
                running_workers = snapshot.running_workers,
                pending_tasks = snapshot.pending_tasks,
                "Stopping trampoline scheduler"
            );
        }
        let mut cleared = 0;
        let mut discarded = 0;
        self.workers.retain(|_, worker| {
            cleared += 1;
            // A running loop still dequeues what it holds.
            if !worker.is_running() {
                discarded += worker.pending();
            }
            false
        });
        self.stats.record_discarded(discarded);
        debug!(cleared, discarded, "Cleared tracked scheduler workers");
        cleared
    }

    fn schedule(&self, task: Continuation, front: bool, nest: bool, sync: bool) {
        let (worker, was_running) = self.with_worker(|worker| {
            worker.push(task, front, nest);
            (worker.clone(), worker.set_running(true))
        });
        self.stats.record_enqueued();

        if sync {
            worker.run_loop(&self.stats);
            worker.set_running(was_running);
        } else if !was_running {
            worker.run_loop(&self.stats);
            worker.set_running(false);
        } else {
            trace!(worker = worker.number(), "Queued continuation");
        }
    }

    /// Runs `f` against this thread's worker, creating it on first use.
    ///
    /// `f` runs while the map entry is held, so the worker cannot be pruned
    /// between lookup and the state change `f` makes. `f` must not re-enter
    /// the scheduler.
    fn with_worker<R>(&self, f: impl FnOnce(&Arc<Worker>) -> R) -> R {
        let thread = std::thread::current().id();
        if let Some(worker) = self.workers.get(&thread) {
            return f(worker.value());
        }

        let mut created = None;
        let result = {
            let entry = self.workers.entry(thread).or_insert_with(|| {
                let number = self.next_worker.fetch_add(1, Ordering::Relaxed) + 1;
                created = Some(number);
                Arc::new(Worker::new(number, thread))
            });
            f(entry.value())
        };

        if let Some(number) = created {
            self.stats.record_worker_created();
            debug!(worker = number, ?thread, "Created scheduler worker");
            if self.workers.len() > self.config.max_tracked_workers {
                self.prune_idle();
            }
        }
        result
    }

    fn prune_idle(&self) {
        let mut pruned = 0_usize;
        self.workers.retain(|_, worker| {
            let idle = worker.is_idle();
            if idle {
                pruned += 1;
            }
            !idle
        });
        // Other threads may insert while this runs, so only `pruned` is exact.
        let tracked = self.workers.len();
        debug!(pruned, tracked, "Pruned idle scheduler workers");

        if tracked > self.config.max_tracked_workers {
            warn!(
                tracked,
                max = self.config.max_tracked_workers,
                "All tracked scheduler workers are busy; exceeding configured maximum"
            );
        }
    }
}

impl Service for TrampolineScheduler {
    fn name(&self) -> &str {
        "trampoline-scheduler"
    }

    fn start(&self) -> Result<(), RouteflowError> {
        self.config.validate()
    }

    fn stop(&self) -> Result<(), RouteflowError> {
        self.shutdown();
        Ok(())
    }
}
