//! Commit/rollback hook bound to one idempotency key.

use super::IdempotentRepository;
use crate::errors::RepositoryError;
use crate::exchange::{Synchronization, UnitOfWork};
use std::sync::Arc;
use tracing::{debug, warn};

/// Completion hook that commits or rolls back an idempotency key.
///
/// On success a lazily checked key is added now and then confirmed. On
/// failure an eagerly added key is removed when `remove_on_failure` is set,
/// so the message can be redelivered. A failure consumed by an error handler
/// counts as a failure for rollback purposes.
#[derive(Debug)]
pub struct IdempotentOnCompletion {
    repository: Arc<dyn IdempotentRepository>,
    key: String,
    eager: bool,
    remove_on_failure: bool,
}

impl IdempotentOnCompletion {
    /// Creates a hook for `key`.
    #[must_use]
    pub fn new(
        repository: Arc<dyn IdempotentRepository>,
        key: impl Into<String>,
        eager: bool,
        remove_on_failure: bool,
    ) -> Self {
        Self {
            repository,
            key: key.into(),
            eager,
            remove_on_failure,
        }
    }

    /// Returns the key this hook is bound to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn on_completed_message(&self, uow: &UnitOfWork) {
        if !self.eager {
            if let Err(e) = self.repository.add(&self.key) {
                self.record(uow, e);
                return;
            }
        }
        if let Err(e) = self.repository.confirm(&self.key) {
            self.record(uow, e);
        }
    }

    fn on_failed_message(&self, uow: &UnitOfWork) {
        if !(self.eager && self.remove_on_failure) {
            return;
        }
        match self.repository.remove(&self.key) {
            Ok(removed) => {
                debug!(uow_id = %uow.id(), key = %self.key, removed, "Rolled back idempotency key");
            }
            Err(e) => self.record(uow, e),
        }
    }

    fn record(&self, uow: &UnitOfWork, error: RepositoryError) {
        warn!(uow_id = %uow.id(), key = %self.key, error = %error, "Idempotent repository failed during completion");
        uow.set_error(error);
    }
}

impl Synchronization for IdempotentOnCompletion {
    fn on_complete(&self, uow: &UnitOfWork) {
        if self.remove_on_failure && uow.is_failure_handled() {
            self.on_failed_message(uow);
        } else {
            self.on_completed_message(uow);
        }
    }

    fn on_failure(&self, uow: &UnitOfWork) {
        self.on_failed_message(uow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RouteflowError;
    use crate::exchange::Message;
    use crate::idempotency::{MemoryIdempotentRepository, MockIdempotentRepository};

    fn hook(repo: &Arc<MemoryIdempotentRepository>, eager: bool, remove: bool) -> IdempotentOnCompletion {
        IdempotentOnCompletion::new(repo.clone(), "k", eager, remove)
    }

    #[test]
    fn test_lazy_commit_on_success() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        let uow = UnitOfWork::new(Message::new());

        hook(&repo, false, true).on_complete(&uow);
        assert!(repo.contains("k").unwrap());
    }

    #[test]
    fn test_eager_success_leaves_key() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        repo.add("k").unwrap();
        let uow = UnitOfWork::new(Message::new());

        hook(&repo, true, true).on_complete(&uow);
        assert!(repo.contains("k").unwrap());
    }

    #[test]
    fn test_eager_rollback_on_failure() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        repo.add("k").unwrap();
        let uow = UnitOfWork::new(Message::new());

        hook(&repo, true, true).on_failure(&uow);
        assert!(!repo.contains("k").unwrap());
    }

    #[test]
    fn test_no_rollback_without_remove_on_failure() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        repo.add("k").unwrap();
        let uow = UnitOfWork::new(Message::new());

        hook(&repo, true, false).on_failure(&uow);
        assert!(repo.contains("k").unwrap());
    }

    #[test]
    fn test_lazy_failure_does_not_commit() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        let uow = UnitOfWork::new(Message::new());

        hook(&repo, false, true).on_failure(&uow);
        assert!(!repo.contains("k").unwrap());
    }

    #[test]
    fn test_handled_failure_rolls_back() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        repo.add("k").unwrap();
        let uow = UnitOfWork::new(Message::new());
        uow.set_error(RouteflowError::downstream("boom"));
        uow.mark_failure_handled();
        assert!(!uow.is_failed());

        hook(&repo, true, true).on_complete(&uow);
        assert!(!repo.contains("k").unwrap());
    }

    #[test]
    fn test_confirm_failure_is_recorded() {
        let mut mock = MockIdempotentRepository::new();
        mock.expect_confirm()
            .returning(|key: &str| Err(RepositoryError::new("mock", "confirm", "offline").with_key(key)));
        let uow = UnitOfWork::new(Message::new());

        IdempotentOnCompletion::new(Arc::new(mock), "k", true, true).on_complete(&uow);
        let error = uow.error().unwrap();
        assert!(error.to_string().contains("confirm"));
    }
}
