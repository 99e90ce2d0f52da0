//! Cooperative per-thread trampoline scheduling.
//!
//! Stages hand continuations to the [`TrampolineScheduler`] instead of
//! calling the next stage directly. Each calling thread gets its own
//! [`Worker`], which drains continuations in a loop so that chains of
//! callbacks never grow the native stack.
//!
//! Ordering guarantees:
//! - continuations scheduled with `schedule_continue` run FIFO within a frame
//! - `schedule_start` opens a nested frame that drains completely before the
//!   frame it interrupted resumes
//! - nothing is ordered across workers (threads)

mod config;
mod continuation;
mod stats;
mod trampoline;
mod worker;

pub use config::SchedulerConfig;
pub use continuation::Continuation;
pub use stats::{SchedulerStatistics, StatisticsSnapshot};
pub use trampoline::TrampolineScheduler;
pub use worker::Worker;
