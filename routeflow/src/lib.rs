//! # Routeflow
//!
//! The asynchronous core of a message-routing engine.
//!
//! Routeflow provides:
//!
//! - **Trampoline scheduling**: per-thread workers drain chains of continuations
//!   in a loop, so callback-style stages never grow the native stack
//! - **A stage protocol**: `process(uow, on_done) -> bool`, completing either
//!   synchronously or later through the scheduler
//! - **Idempotent delivery**: a guard stage that forwards each message at most
//!   once per key, with commit and rollback tied to completion hooks
//! - **Lifecycle**: services that start with their host and release
//!   per-thread state on shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use routeflow::prelude::*;
//! use std::sync::Arc;
//!
//! let scheduler = Arc::new(TrampolineScheduler::new());
//! let repository = Arc::new(MemoryIdempotentRepository::new());
//! let guard = IdempotentGuard::new(
//!     "dedup",
//!     KeyExpression::header("id"),
//!     repository,
//!     Arc::new(NoOpStage::new("deliver")),
//! );
//! let route = Route::new("orders", scheduler, Arc::new(guard));
//!
//! let first = Arc::new(UnitOfWork::new(Message::new().header("id", 1.into())));
//! route.submit(first, |uow| assert!(!uow.is_duplicate()));
//!
//! let second = Arc::new(UnitOfWork::new(Message::new().header("id", 1.into())));
//! route.submit(second, |uow| assert!(uow.is_duplicate()));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod exchange;
pub mod idempotency;
pub mod lifecycle;
pub mod observability;
pub mod route;
pub mod scheduler;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::RouteflowConfig;
    pub use crate::errors::{
        ErrorCategory, MissingIdentityError, RepositoryError, RouteflowError,
    };
    pub use crate::exchange::{
        Message, OnCompletion, PropertyBag, Synchronization, UnitOfWork,
        DUPLICATE_MESSAGE, FAILURE_HANDLED,
    };
    pub use crate::idempotency::{
        IdempotentGuard, IdempotentGuardConfig, IdempotentOnCompletion,
        IdempotentRepository, KeyExpression, MemoryIdempotentRepository,
        MemoryRepositoryConfig,
    };
    pub use crate::lifecycle::{Service, ServiceRegistry};
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::route::Route;
    pub use crate::scheduler::{
        Continuation, SchedulerConfig, StatisticsSnapshot, TrampolineScheduler,
    };
    pub use crate::stages::{
        AsyncStage, AsyncWork, DoneCallback, FnStage, NoOpStage, Pipeline, Stage,
        StageExt,
    };
}
