//! Idempotent delivery.
//!
//! An [`IdempotentGuard`] wraps a stage and forwards each unit of work at most
//! once per key. Keys come from a [`KeyExpression`] and are stored in an
//! [`IdempotentRepository`]; an [`IdempotentOnCompletion`] hook commits or
//! rolls the key back once processing is known to have succeeded or failed.

mod completion;
mod config;
mod expression;
mod guard;
mod repository;

pub use completion::IdempotentOnCompletion;
pub use config::IdempotentGuardConfig;
pub use expression::KeyExpression;
pub use guard::IdempotentGuard;
pub use repository::{
    IdempotentRepository, MemoryIdempotentRepository, MemoryRepositoryConfig, RepositoryService,
};

#[cfg(test)]
pub use repository::MockIdempotentRepository;
