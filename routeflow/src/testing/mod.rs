//! Testing utilities for routeflow stages.
//!
//! This module provides:
//! - Mock stages, synchronous and deferred
//! - A repository that counts calls
//! - Unit-of-work fixtures and assertions

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_completed, assert_duplicate, assert_failed_with, assert_succeeded};
pub use fixtures::{uow_with_id, TestUnitOfWork};
pub use mocks::{CountingRepository, DeferredStage, FailingStage, RecordingStage};
