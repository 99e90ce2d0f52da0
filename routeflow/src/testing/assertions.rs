//! Test assertions for units of work.

use crate::errors::ErrorCategory;
use crate::exchange::UnitOfWork;

/// Asserts that the unit of work finished without an error.
pub fn assert_succeeded(uow: &UnitOfWork) {
    assert!(
        !uow.is_failed(),
        "Expected success, got error: {:?}",
        uow.error().map(|e| e.to_string())
    );
}

/// Asserts that the unit of work failed with an error of the given category.
pub fn assert_failed_with(uow: &UnitOfWork, expected: ErrorCategory) {
    let error = uow.error();
    assert!(error.is_some(), "Expected {expected:?} failure, but unit of work succeeded");
    if let Some(error) = error {
        assert_eq!(
            error.category(),
            expected,
            "Expected {:?} failure, got: {}",
            expected,
            error
        );
    }
}

/// Asserts that the unit of work was flagged as a duplicate.
pub fn assert_duplicate(uow: &UnitOfWork) {
    assert!(
        uow.is_duplicate(),
        "Expected unit of work {} to be flagged as duplicate. Properties: {:?}",
        uow.id(),
        uow.properties().to_dict()
    );
}

/// Asserts that the unit of work has finished and fired its hooks.
pub fn assert_completed(uow: &UnitOfWork) {
    assert!(uow.is_completed(), "Expected unit of work {} to be done", uow.id());
    assert_eq!(uow.pending_hooks(), 0, "Completion hooks still pending");
}
