//! Message payload and headers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message carried by a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, serde_json::Value>,
    /// Message body.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message with the given body.
    #[must_use]
    pub fn with_body(body: serde_json::Value) -> Self {
        Self {
            headers: HashMap::new(),
            body,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    /// Gets a header value.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&serde_json::Value> {
        self.headers.get(name)
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.headers.insert(name.into(), value);
    }

    /// Removes a header.
    pub fn remove_header(&mut self, name: &str) -> Option<serde_json::Value> {
        self.headers.remove(name)
    }
}
