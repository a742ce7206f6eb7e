//! Per-evaluation variable bindings

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::convert::{json_to_val, to_val, Val};
use crate::decls::THIS;
use crate::error::{ExprError, Result};

/// Variable bindings supplied to one evaluation
///
/// Host values are converted through serde, so any `Serialize` type can be
/// bound: structs become maps keyed by their serialized field names.
///
/// # Examples
///
/// ```
/// use cel_expr::Activation;
/// use serde_json::json;
///
/// let input = Activation::new()
///     .bind("v", &3)
///     .unwrap()
///     .bind("this", &json!({"v1": 1}))
///     .unwrap();
/// assert!(input.get("v").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Activation {
    variables: BTreeMap<String, Val>,
    deadline: Option<Instant>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a serializable host value
    pub fn bind<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        self.variables.insert(name.into(), to_val(value)?);
        Ok(self)
    }

    /// Bind an engine value as is
    pub fn with_value(mut self, name: impl Into<String>, value: Val) -> Self {
        self.insert_value(name, value);
        self
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Val) {
        self.variables.insert(name.into(), value);
    }

    /// Abort evaluation with [`ExprError::Interrupted`] once `deadline` passes
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Bind every top-level entry of a JSON object
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let JsonValue::Object(entries) = value else {
            return Err(ExprError::Conversion(format!(
                "activation must be a JSON object, got {}",
                value
            )));
        };
        Ok(Self {
            variables: entries
                .iter()
                .map(|(name, v)| (name.clone(), json_to_val(v)))
                .collect(),
            deadline: None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Val> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn variables(&self) -> impl Iterator<Item = (&String, &Val)> {
        self.variables.iter()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Build an activation binding `record` as `this`
pub fn wrap_this<T: Serialize + ?Sized>(record: &T) -> Result<Activation> {
    Activation::new().bind(THIS, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_serializable() {
        #[derive(Serialize)]
        struct Record {
            name: &'static str,
            count: u32,
        }

        let input = Activation::new()
            .bind("r", &Record { name: "a", count: 2 })
            .unwrap();
        match input.get("r") {
            Some(Val::Map(map)) => assert_eq!(map.map.len(), 2),
            other => panic!("Expected Map, got {:?}", other),
        }
    }

    #[test]
    fn test_wrap_this() {
        let input = wrap_this(&json!({"v1": 1})).unwrap();
        assert_eq!(input.len(), 1);
        assert!(input.get(THIS).is_some());
    }

    #[test]
    fn test_from_json() {
        let input = Activation::from_json(&json!({"a": 1, "b": [true]})).unwrap();
        assert_eq!(input.len(), 2);
        assert!(matches!(input.get("a"), Some(Val::Int(1))));

        let err = Activation::from_json(&json!([1])).unwrap_err();
        assert!(matches!(err, ExprError::Conversion(_)));
    }

    #[test]
    fn test_timeout_sets_deadline() {
        let input = Activation::new().with_timeout(Duration::from_secs(5));
        assert!(input.deadline().unwrap() > Instant::now());
        assert!(Activation::new().is_empty());
    }
}
