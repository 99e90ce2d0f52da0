//! Informational scheduler counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Counters for scheduler activity.
///
/// Updated only at worker creation, loop entry/exit and enqueue/dequeue
/// boundaries. When disabled every update is a no-op; scheduling never reads
/// these values.
#[derive(Debug, Default)]
pub struct SchedulerStatistics {
    enabled: AtomicBool,
    created_workers: AtomicU64,
    running_workers: AtomicI64,
    pending_tasks: AtomicI64,
}

impl SchedulerStatistics {
    /// Creates counters, enabled or not.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            ..Default::default()
        }
    }

    /// Returns true if counters are being maintained.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns counting on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_created(&self) {
        if self.is_enabled() {
            self.created_workers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_loop_entered(&self) {
        if self.is_enabled() {
            self.running_workers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_loop_exited(&self) {
        if self.is_enabled() {
            self.running_workers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_enqueued(&self) {
        if self.is_enabled() {
            self.pending_tasks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dequeued(&self) {
        if self.is_enabled() {
            self.pending_tasks.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_discarded(&self, tasks: usize) {
        if self.is_enabled() && tasks > 0 {
            let tasks = i64::try_from(tasks).unwrap_or(i64::MAX);
            self.pending_tasks.fetch_sub(tasks, Ordering::Relaxed);
        }
    }

    /// Returns the number of workers created.
    #[must_use]
    pub fn created_workers(&self) -> u64 {
        self.created_workers.load(Ordering::Relaxed)
    }

    /// Returns the number of run loops currently active.
    #[must_use]
    pub fn running_workers(&self) -> i64 {
        self.running_workers.load(Ordering::Relaxed)
    }

    /// Returns the number of queued continuations.
    #[must_use]
    pub fn pending_tasks(&self) -> i64 {
        self.pending_tasks.load(Ordering::Relaxed)
    }

    /// Takes a serializable copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            enabled: self.is_enabled(),
            created_workers: self.created_workers(),
            running_workers: self.running_workers(),
            pending_tasks: self.pending_tasks(),
        }
    }
}

/// Point-in-time copy of [`SchedulerStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Whether counting was enabled.
    pub enabled: bool,
    /// Workers created.
    pub created_workers: u64,
    /// Run loops active.
    pub running_workers: i64,
    /// Queued continuations.
    pub pending_tasks: i64,
}
