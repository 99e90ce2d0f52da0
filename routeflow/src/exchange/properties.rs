//! Thread-safe property bag.

use parking_lot::RwLock;
use std::collections::HashMap;

/// A thread-safe bag of out-of-band properties attached to a unit of work.
///
/// Unlike message headers, properties never leave the process; stages use
/// them for flags such as "duplicate".
#[derive(Debug, Default)]
pub struct PropertyBag {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl PropertyBag {
    /// Creates a new empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Reads a boolean flag; absent or non-boolean values are `false`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.data
            .read()
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Clone for PropertyBag {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let bag = PropertyBag::new();
        assert!(bag.set("key", serde_json::json!("value")).is_none());

        assert_eq!(bag.get("key"), Some(serde_json::json!("value")));
        assert!(bag.contains_key("key"));
        assert!(!bag.contains_key("other"));
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let bag = PropertyBag::new();
        bag.set("key", serde_json::json!(1));
        let previous = bag.set("key", serde_json::json!(2));

        assert_eq!(previous, Some(serde_json::json!(1)));
        assert_eq!(bag.get("key"), Some(serde_json::json!(2)));
    }

    #[test]
    fn test_flag() {
        let bag = PropertyBag::new();
        assert!(!bag.flag("dup"));

        bag.set("dup", serde_json::json!("yes"));
        assert!(!bag.flag("dup"));

        bag.set("dup", serde_json::json!(true));
        assert!(bag.flag("dup"));

        bag.remove("dup");
        assert!(!bag.flag("dup"));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let bag = PropertyBag::new();
        bag.set("a", serde_json::json!(1));
        let copy = bag.clone();
        bag.set("b", serde_json::json!(2));

        assert_eq!(copy.len(), 1);
        assert_eq!(bag.to_dict().len(), 2);
    }
}
