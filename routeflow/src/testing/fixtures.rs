//! Test fixtures for building units of work.

use std::sync::Arc;

use crate::exchange::{Message, UnitOfWork};

/// Builder for test units of work.
#[derive(Debug, Default)]
pub struct TestUnitOfWork {
    message: Message,
    properties: Vec<(String, serde_json::Value)>,
    transacted: bool,
}

impl TestUnitOfWork {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.message.set_header(name, value);
        self
    }

    /// Sets the input body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.message.body = body;
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.push((key.into(), value));
        self
    }

    /// Marks the unit of work as transacted.
    #[must_use]
    pub fn transacted(mut self) -> Self {
        self.transacted = true;
        self
    }

    /// Builds the shared unit of work.
    #[must_use]
    pub fn build(self) -> Arc<UnitOfWork> {
        let mut uow = UnitOfWork::new(self.message);
        if self.transacted {
            uow = uow.transacted();
        }
        for (key, value) in self.properties {
            uow.properties().set(key, value);
        }
        Arc::new(uow)
    }
}

/// Creates a unit of work carrying a single `id` header.
#[must_use]
pub fn uow_with_id(id: impl Into<serde_json::Value>) -> Arc<UnitOfWork> {
    TestUnitOfWork::new().with_header("id", id.into()).build()
}
