//! Key extraction from a unit of work.

use crate::errors::{MissingIdentityError, RouteflowError};
use crate::exchange::UnitOfWork;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::sync::Arc;

type ExtractFn = dyn Fn(&UnitOfWork) -> Result<Option<String>, RouteflowError> + Send + Sync;

/// Derives an idempotency key from a unit of work.
///
/// Every expression carries a human-readable description that ends up in
/// [`MissingIdentityError`] when no key can be derived.
#[derive(Clone)]
pub struct KeyExpression {
    description: String,
    extract: Arc<ExtractFn>,
}

impl Debug for KeyExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExpression")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl KeyExpression {
    /// Uses the value of an input header.
    #[must_use]
    pub fn header(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("header({name})");
        Self::from_fn(description, move |uow| {
            Ok(uow.with_input(|m| m.get_header(&name).and_then(value_to_key)))
        })
    }

    /// Uses the value of a unit-of-work property.
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("property({name})");
        Self::from_fn(description, move |uow| {
            Ok(uow.properties().get(&name).as_ref().and_then(value_to_key))
        })
    }

    /// Uses the value at a JSON pointer into the input body, e.g. `/order/id`.
    #[must_use]
    pub fn body_pointer(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        let description = format!("body({pointer})");
        Self::from_fn(description, move |uow| {
            Ok(uow.with_input(|m| m.body.pointer(&pointer).and_then(value_to_key)))
        })
    }

    /// Hashes several input headers into one hex-encoded SHA-256 key.
    ///
    /// Yields no key if any of the headers is missing.
    #[must_use]
    pub fn hashed_headers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let description = format!("sha256({})", names.join(","));
        Self::from_fn(description, move |uow| {
            uow.with_input(|m| {
                let mut hasher = Sha256::new();
                for name in &names {
                    let Some(value) = m.get_header(name).and_then(value_to_key) else {
                        return Ok(None);
                    };
                    hasher.update(name.as_bytes());
                    hasher.update(b"=");
                    hasher.update(value.as_bytes());
                    hasher.update(b"\n");
                }
                Ok(Some(hex::encode(hasher.finalize())))
            })
        })
    }

    /// Uses an arbitrary function.
    pub fn from_fn<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&UnitOfWork) -> Result<Option<String>, RouteflowError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            extract: Arc::new(f),
        }
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluates the expression.
    ///
    /// Both an absent key and a failing extraction become a
    /// [`MissingIdentityError`].
    pub fn evaluate(&self, uow: &UnitOfWork) -> Result<String, MissingIdentityError> {
        match (self.extract)(uow) {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(MissingIdentityError::new(uow.id(), &self.description)),
            Err(e) => Err(MissingIdentityError::new(uow.id(), &self.description).with_cause(e.to_string())),
        }
    }
}

fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Message;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn uow_with_headers(headers: &[(&str, Value)]) -> UnitOfWork {
        let mut message = Message::new();
        for (name, value) in headers {
            message.set_header(*name, value.clone());
        }
        UnitOfWork::new(message)
    }

    #[test]
    fn test_header() {
        let uow = uow_with_headers(&[("id", json!(1)), ("name", json!("abc"))]);
        assert_eq!(KeyExpression::header("id").evaluate(&uow).unwrap(), "1");
        assert_eq!(KeyExpression::header("name").evaluate(&uow).unwrap(), "abc");
    }

    #[test]
    fn test_missing_header() {
        let uow = uow_with_headers(&[("other", json!("x"))]);
        let err = KeyExpression::header("id").evaluate(&uow).unwrap_err();
        assert_eq!(err.expression, "header(id)");
        assert_eq!(err.uow_id, uow.id());
    }

    #[test]
    fn test_null_header_is_missing() {
        let uow = uow_with_headers(&[("id", Value::Null)]);
        assert!(KeyExpression::header("id").evaluate(&uow).is_err());
    }

    #[test]
    fn test_property() {
        let uow = UnitOfWork::new(Message::new());
        uow.properties().set("correlation", json!("c-7"));
        assert_eq!(KeyExpression::property("correlation").evaluate(&uow).unwrap(), "c-7");
    }

    #[test]
    fn test_body_pointer() {
        let uow = UnitOfWork::new(Message::with_body(json!({"order": {"id": "o-42"}})));
        assert_eq!(KeyExpression::body_pointer("/order/id").evaluate(&uow).unwrap(), "o-42");
        assert!(KeyExpression::body_pointer("/order/missing").evaluate(&uow).is_err());
    }

    #[test]
    fn test_hashed_headers() {
        let expr = KeyExpression::hashed_headers(["tenant", "id"]);
        let a = uow_with_headers(&[("tenant", json!("t1")), ("id", json!(5))]);
        let b = uow_with_headers(&[("id", json!(5)), ("tenant", json!("t1"))]);
        let c = uow_with_headers(&[("tenant", json!("t2")), ("id", json!(5))]);

        let key = expr.evaluate(&a).unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(key, expr.evaluate(&b).unwrap());
        assert_ne!(key, expr.evaluate(&c).unwrap());
        assert_eq!(expr.description(), "sha256(tenant,id)");
    }

    #[test]
    fn test_hashed_headers_missing_one() {
        let expr = KeyExpression::hashed_headers(["tenant", "id"]);
        let uow = uow_with_headers(&[("tenant", json!("t1"))]);
        assert!(expr.evaluate(&uow).is_err());
    }

    #[test]
    fn test_failing_function_carries_cause() {
        let expr = KeyExpression::from_fn("custom", |_| Err(RouteflowError::Internal("lookup failed".into())));
        let uow = UnitOfWork::new(Message::new());
        let err = expr.evaluate(&uow).unwrap_err();
        assert!(err.cause.unwrap().contains("lookup failed"));
    }
}
