//! The idempotent guard stage.

use super::{
    IdempotentGuardConfig, IdempotentOnCompletion, IdempotentRepository, KeyExpression,
    RepositoryService,
};
use crate::errors::RouteflowError;
use crate::exchange::{Synchronization, UnitOfWork, DUPLICATE_MESSAGE};
use crate::lifecycle::ServiceRegistry;
use crate::stages::{DoneCallback, Stage};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

type DuplicateHandler = Arc<dyn Fn(&UnitOfWork, &str) + Send + Sync>;

/// A stage that forwards each message at most once per idempotency key.
///
/// Keys are derived with a [`KeyExpression`] and recorded in an
/// [`IdempotentRepository`]. Recognised duplicates are flagged with the
/// [`DUPLICATE_MESSAGE`] property and, unless configured otherwise, are not
/// forwarded to the wrapped stage.
///
/// # Example
///
/// ```rust
/// use routeflow::idempotency::{IdempotentGuard, KeyExpression, MemoryIdempotentRepository};
/// use routeflow::stages::NoOpStage;
/// use std::sync::Arc;
///
/// let guard = IdempotentGuard::new(
///     "dedup",
///     KeyExpression::header("id"),
///     Arc::new(MemoryIdempotentRepository::new()),
///     Arc::new(NoOpStage::new("downstream")),
/// );
/// assert_eq!(guard.duplicate_message_count(), 0);
/// ```
pub struct IdempotentGuard {
    name: String,
    expression: KeyExpression,
    repository: Arc<dyn IdempotentRepository>,
    next: Arc<dyn Stage>,
    config: IdempotentGuardConfig,
    owns_repository: bool,
    duplicate_count: AtomicU64,
    on_duplicate: Option<DuplicateHandler>,
}

impl Debug for IdempotentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotentGuard")
            .field("name", &self.name)
            .field("expression", &self.expression)
            .field("repository", &self.repository.name())
            .field("next", &self.next.name())
            .field("config", &self.config)
            .field("duplicate_count", &self.duplicate_message_count())
            .finish_non_exhaustive()
    }
}

impl IdempotentGuard {
    /// Creates a guard with the default configuration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        expression: KeyExpression,
        repository: Arc<dyn IdempotentRepository>,
        next: Arc<dyn Stage>,
    ) -> Self {
        Self {
            name: name.into(),
            expression,
            repository,
            next,
            config: IdempotentGuardConfig::default(),
            owns_repository: false,
            duplicate_count: AtomicU64::new(0),
            on_duplicate: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: IdempotentGuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Marks the repository as owned, so [`IdempotentGuard::shutdown`] stops it.
    #[must_use]
    pub fn owning_repository(mut self) -> Self {
        self.owns_repository = true;
        self
    }

    /// Sets a callback invoked with the unit of work and key of each duplicate.
    #[must_use]
    pub fn on_duplicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&UnitOfWork, &str) + Send + Sync + 'static,
    {
        self.on_duplicate = Some(Arc::new(f));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &IdempotentGuardConfig {
        &self.config
    }

    /// Returns the key expression.
    #[must_use]
    pub fn expression(&self) -> &KeyExpression {
        &self.expression
    }

    /// Returns the repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn IdempotentRepository> {
        &self.repository
    }

    /// Returns the number of duplicates recognised so far.
    #[must_use]
    pub fn duplicate_message_count(&self) -> u64 {
        self.duplicate_count.load(Ordering::Relaxed)
    }

    /// Resets the duplicate counter to zero.
    pub fn reset_duplicate_message_count(&self) {
        self.duplicate_count.store(0, Ordering::Relaxed);
    }

    /// Registers and starts the repository in the host's registry.
    ///
    /// A repository already registered under the same name is not started
    /// again.
    pub fn start(&self, registry: &ServiceRegistry) -> Result<(), RouteflowError> {
        let service = Arc::new(RepositoryService::new(self.repository.clone()));
        if registry.start_service(service)? {
            info!(guard = %self.name, repository = self.repository.name(), "Started idempotent repository");
        }
        Ok(())
    }

    /// Stops the repository if this guard owns it.
    pub fn shutdown(&self, registry: &ServiceRegistry) -> Result<(), RouteflowError> {
        if !self.owns_repository {
            return Ok(());
        }
        registry.remove(self.repository.name());
        self.repository.stop()?;
        info!(guard = %self.name, repository = self.repository.name(), "Stopped idempotent repository");
        Ok(())
    }

    fn on_duplicate_message(&self, uow: &UnitOfWork, key: &str) {
        let count = self.duplicate_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(guard = %self.name, uow_id = %uow.id(), key, count, "Duplicate message");
        if let Some(handler) = &self.on_duplicate {
            handler(uow, key);
        }
    }

    fn fail(uow: &UnitOfWork, error: impl Into<RouteflowError>, on_done: DoneCallback) -> bool {
        uow.set_error(error);
        on_done(true);
        true
    }
}

impl Stage for IdempotentGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        let key = match self.expression.evaluate(uow) {
            Ok(key) => key,
            Err(e) => {
                debug!(guard = %self.name, uow_id = %uow.id(), expression = %e.expression, "No idempotency key");
                return Self::fail(uow, e, on_done);
            }
        };

        let is_new = if self.config.eager {
            self.repository.add(&key)
        } else {
            // Check now, commit on success. Concurrent arrivals can both pass.
            self.repository.contains(&key).map(|present| !present)
        };
        let is_new = match is_new {
            Ok(is_new) => is_new,
            Err(e) => return Self::fail(uow, e, on_done),
        };

        if !is_new {
            uow.properties().set(DUPLICATE_MESSAGE, serde_json::Value::Bool(true));
            self.on_duplicate_message(uow, &key);
            if self.config.skip_duplicate {
                on_done(true);
                return true;
            }
        }

        trace!(guard = %self.name, uow_id = %uow.id(), key = %key, "Forwarding");
        let completion = Arc::new(IdempotentOnCompletion::new(
            self.repository.clone(),
            key,
            self.config.eager,
            self.config.remove_on_failure,
        ));

        let callback: DoneCallback = if self.config.completion_eager {
            let target = uow.clone();
            Box::new(move |sync| {
                if target.is_failed() {
                    completion.on_failure(&target);
                } else {
                    completion.on_complete(&target);
                }
                on_done(sync);
            })
        } else {
            uow.add_on_completion(completion);
            on_done
        };

        self.next.process(uow, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, RepositoryError};
    use crate::exchange::Message;
    use crate::idempotency::{MemoryIdempotentRepository, MockIdempotentRepository};
    use crate::testing::{CountingRepository, FailingStage, RecordingStage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct Harness {
        repo: Arc<MemoryIdempotentRepository>,
        downstream: Arc<RecordingStage>,
        guard: IdempotentGuard,
    }

    fn harness(config: IdempotentGuardConfig) -> Harness {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        let downstream = Arc::new(RecordingStage::new("downstream"));
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            repo.clone(),
            downstream.clone(),
        )
        .with_config(config);
        Harness {
            repo,
            downstream,
            guard,
        }
    }

    fn uow(id: i64) -> Arc<UnitOfWork> {
        Arc::new(UnitOfWork::new(Message::new().header("id", json!(id))))
    }

    /// Runs the guard and finishes the unit of work like a route would.
    fn submit(guard: &IdempotentGuard, uow: &Arc<UnitOfWork>) -> bool {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let sync = guard.process(uow, Box::new(move |_| flag.store(true, Ordering::SeqCst)));
        assert!(called.load(Ordering::SeqCst));
        uow.done();
        sync
    }

    #[test]
    fn test_concrete_scenario() {
        let h = harness(IdempotentGuardConfig::default());

        let first = uow(1);
        submit(&h.guard, &first);
        assert_eq!(h.downstream.call_count(), 1);
        assert!(h.repo.contains("1").unwrap());
        assert!(!first.is_duplicate());

        let second = uow(1);
        assert!(submit(&h.guard, &second));
        assert_eq!(h.downstream.call_count(), 1);
        assert_eq!(h.guard.duplicate_message_count(), 1);
        assert_eq!(second.properties().get(DUPLICATE_MESSAGE), Some(json!(true)));
        assert!(!second.is_failed());
    }

    #[test]
    fn test_sequential_dedup_counts_each_repeat() {
        let h = harness(IdempotentGuardConfig::default());
        for _ in 0..5 {
            submit(&h.guard, &uow(7));
        }
        assert_eq!(h.downstream.call_count(), 1);
        assert_eq!(h.guard.duplicate_message_count(), 4);

        h.guard.reset_duplicate_message_count();
        assert_eq!(h.guard.duplicate_message_count(), 0);
    }

    #[test]
    fn test_rollback_on_failure_allows_redelivery() {
        let h = harness(IdempotentGuardConfig::default());
        h.downstream.fail_next("transient");

        let first = uow(3);
        submit(&h.guard, &first);
        assert!(first.is_failed());
        assert!(!h.repo.contains("3").unwrap());

        let retry = uow(3);
        submit(&h.guard, &retry);
        assert!(!retry.is_duplicate());
        assert!(!retry.is_failed());
        assert_eq!(h.downstream.call_count(), 2);
        assert!(h.repo.contains("3").unwrap());
    }

    #[test]
    fn test_failure_keeps_key_without_remove_on_failure() {
        let h = harness(IdempotentGuardConfig::new().with_remove_on_failure(false));
        h.downstream.fail_next("permanent");

        submit(&h.guard, &uow(4));
        assert!(h.repo.contains("4").unwrap());
    }

    #[test]
    fn test_missing_key_never_forwards() {
        for config in [
            IdempotentGuardConfig::default(),
            IdempotentGuardConfig::new().with_eager(false),
            IdempotentGuardConfig::new().with_skip_duplicate(false),
        ] {
            let h = harness(config);
            let unit = Arc::new(UnitOfWork::new(Message::new()));

            assert!(submit(&h.guard, &unit));
            assert_eq!(h.downstream.call_count(), 0);
            let error = unit.error().unwrap();
            assert_eq!(error.category(), ErrorCategory::MissingIdentity);
            assert!(h.repo.is_empty());
        }
    }

    #[test]
    fn test_duplicates_forwarded_when_not_skipping() {
        let h = harness(IdempotentGuardConfig::new().with_skip_duplicate(false));
        submit(&h.guard, &uow(5));
        let repeat = uow(5);
        submit(&h.guard, &repeat);

        assert_eq!(h.downstream.call_count(), 2);
        assert!(repeat.is_duplicate());
        assert_eq!(h.guard.duplicate_message_count(), 1);
    }

    #[test]
    fn test_lazy_commits_only_after_success() {
        let h = harness(IdempotentGuardConfig::new().with_eager(false));
        let unit = uow(6);

        let repo = h.repo.clone();
        let observed = Arc::new(AtomicBool::new(true));
        let o = observed.clone();
        h.guard.process(
            &unit,
            Box::new(move |_| o.store(repo.contains("6").unwrap(), Ordering::SeqCst)),
        );
        // Not committed while the unit of work is still in flight.
        assert!(!observed.load(Ordering::SeqCst));
        assert!(!h.repo.contains("6").unwrap());

        unit.done();
        assert!(h.repo.contains("6").unwrap());
        assert!(submit(&h.guard, &uow(6)));
        assert_eq!(h.guard.duplicate_message_count(), 1);
    }

    #[test]
    fn test_lazy_failure_never_commits() {
        let h = harness(IdempotentGuardConfig::new().with_eager(false));
        h.downstream.fail_next("nope");
        submit(&h.guard, &uow(8));
        assert!(!h.repo.contains("8").unwrap());
    }

    #[test]
    fn test_completion_eager_finalizes_in_callback() {
        let h = harness(
            IdempotentGuardConfig::new()
                .with_eager(false)
                .with_completion_eager(true),
        );
        let unit = uow(9);

        let repo = h.repo.clone();
        let observed = Arc::new(AtomicBool::new(false));
        let o = observed.clone();
        h.guard.process(
            &unit,
            Box::new(move |_| o.store(repo.contains("9").unwrap(), Ordering::SeqCst)),
        );

        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(unit.pending_hooks(), 0);
    }

    #[test]
    fn test_completion_eager_rolls_back_before_callback() {
        let h = harness(IdempotentGuardConfig::new().with_completion_eager(true));
        h.downstream.fail_next("downstream down");
        let unit = uow(14);

        let repo = h.repo.clone();
        let observed = Arc::new(AtomicBool::new(true));
        let o = observed.clone();
        h.guard.process(
            &unit,
            Box::new(move |_| o.store(repo.contains("14").unwrap(), Ordering::SeqCst)),
        );

        // Rolled back inside the wrapped callback, before the unit of work is done.
        assert!(!observed.load(Ordering::SeqCst));
        assert!(!unit.is_completed());
        assert_eq!(unit.pending_hooks(), 0);
        assert!(unit.is_failed());
    }

    #[test]
    fn test_missing_key_touches_no_repository() {
        let repo = Arc::new(CountingRepository::new());
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            repo.clone(),
            Arc::new(RecordingStage::new("downstream")),
        );

        submit(&guard, &Arc::new(UnitOfWork::new(Message::new())));
        assert_eq!(repo.add_calls(), 0);
        assert_eq!(repo.contains_calls(), 0);
        assert_eq!(repo.remove_calls(), 0);
        assert_eq!(repo.confirm_calls(), 0);
    }

    #[test]
    fn test_lazy_checks_before_success_and_adds_at_done() {
        let repo = Arc::new(CountingRepository::new());
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            repo.clone(),
            Arc::new(RecordingStage::new("downstream")),
        )
        .with_config(IdempotentGuardConfig::new().with_eager(false));
        let unit = uow(15);

        guard.process(&unit, Box::new(|_| {}));
        assert_eq!(repo.contains_calls(), 1);
        assert_eq!(repo.add_calls(), 0);
        assert_eq!(repo.confirm_calls(), 0);

        unit.done();
        assert_eq!(repo.add_calls(), 1);
        assert_eq!(repo.confirm_calls(), 1);
        assert_eq!(repo.remove_calls(), 0);
    }

    #[test]
    fn test_eager_failure_adds_then_removes() {
        let repo = Arc::new(CountingRepository::new());
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            repo.clone(),
            Arc::new(FailingStage::new("downstream", "rejected")),
        );
        let unit = uow(16);

        submit(&guard, &unit);
        assert_eq!(unit.error().unwrap().category(), ErrorCategory::DownstreamFailure);
        assert_eq!(repo.add_calls(), 1);
        assert_eq!(repo.contains_calls(), 0);
        assert_eq!(repo.remove_calls(), 1);
        assert_eq!(repo.confirm_calls(), 0);
        assert!(!repo.contains("16").unwrap());
    }

    #[test]
    fn test_deferred_completion_registers_hook() {
        let h = harness(IdempotentGuardConfig::default());
        let unit = uow(10);
        h.guard.process(&unit, Box::new(|_| {}));
        assert_eq!(unit.pending_hooks(), 1);
        unit.done();
        assert_eq!(unit.pending_hooks(), 0);
    }

    #[test]
    fn test_on_duplicate_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        let h = harness(IdempotentGuardConfig::default());
        let guard = h.guard.on_duplicate(move |_, key| s.lock().push(key.to_string()));

        submit(&guard, &uow(11));
        submit(&guard, &uow(11));
        assert_eq!(*seen.lock(), vec!["11".to_string()]);
    }

    #[test]
    fn test_repository_failure_fails_unit_of_work() {
        let mut mock = MockIdempotentRepository::new();
        mock.expect_add()
            .returning(|key: &str| Err(RepositoryError::new("mock", "add", "connection refused").with_key(key)));
        let downstream = Arc::new(RecordingStage::new("downstream"));
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            Arc::new(mock),
            downstream.clone(),
        );
        let unit = uow(12);

        assert!(submit(&guard, &unit));
        assert_eq!(downstream.call_count(), 0);
        assert_eq!(unit.error().unwrap().category(), ErrorCategory::RepositoryAccess);
    }

    #[test]
    fn test_lazy_contains_failure_fails_unit_of_work() {
        let mut mock = MockIdempotentRepository::new();
        mock.expect_contains()
            .returning(|_: &str| Err(RepositoryError::new("mock", "contains", "timeout")));
        let guard = IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            Arc::new(mock),
            Arc::new(RecordingStage::new("downstream")),
        )
        .with_config(IdempotentGuardConfig::new().with_eager(false));
        let unit = uow(13);

        submit(&guard, &unit);
        assert_eq!(unit.error().unwrap().category(), ErrorCategory::RepositoryAccess);
    }

    #[test]
    fn test_concurrent_eager_dedup() {
        let repo = Arc::new(MemoryIdempotentRepository::new());
        let downstream = Arc::new(RecordingStage::new("downstream"));
        let guard = Arc::new(IdempotentGuard::new(
            "dedup",
            KeyExpression::header("id"),
            repo,
            downstream.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || {
                    let unit = uow(99);
                    guard.process(&unit, Box::new(|_| {}));
                    unit.done();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(downstream.call_count(), 1);
        assert_eq!(guard.duplicate_message_count(), 7);
    }

    #[test]
    fn test_start_and_owned_shutdown() {
        let registry = ServiceRegistry::new();
        let h = harness(IdempotentGuardConfig::default());
        let guard = h.guard.owning_repository();

        guard.start(&registry).unwrap();
        assert!(registry.contains("memory-idempotent-repository"));
        guard.start(&registry).unwrap();
        assert_eq!(registry.len(), 1);

        submit(&guard, &uow(14));
        assert!(!h.repo.is_empty());

        guard.shutdown(&registry).unwrap();
        assert!(h.repo.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shared_repository_survives_shutdown() {
        let registry = ServiceRegistry::new();
        let h = harness(IdempotentGuardConfig::default());
        h.guard.start(&registry).unwrap();
        submit(&h.guard, &uow(15));

        h.guard.shutdown(&registry).unwrap();
        assert!(h.repo.contains("15").unwrap());
    }
}
