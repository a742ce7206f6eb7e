//! Value conversion between host shapes and engine values
//!
//! Host values travel through `serde_json::Value`: inputs are serialized into
//! it and converted to engine values; results are normalized back into it so
//! callers never handle the engine's value wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use cel_interpreter::objects::{Key, Map};
use cel_interpreter::ExecutionError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{ExprError, Result};

/// Engine value handed to and returned from native bindings
pub type Val = cel_interpreter::Value;

/// Return type of native bindings
pub type ValResult = std::result::Result<Val, ExecutionError>;

/// Build an explicit error value for a binding to return
///
/// The message surfaces verbatim as the evaluation error.
pub fn new_err(message: impl Into<String>) -> ExecutionError {
    ExecutionError::FunctionError {
        function: String::new(),
        message: message.into(),
    }
}

/// Convert serde_json::Value to an engine value
pub fn json_to_val(value: &JsonValue) -> Val {
    match value {
        JsonValue::Null => Val::Null,
        JsonValue::Bool(b) => Val::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Val::Int(i)
            } else if let Some(u) = n.as_u64() {
                Val::UInt(u)
            } else if let Some(f) = n.as_f64() {
                Val::Float(f)
            } else {
                Val::Null
            }
        }
        JsonValue::String(s) => Val::String(Arc::new(s.clone())),
        JsonValue::Array(arr) => {
            let items: Vec<Val> = arr.iter().map(json_to_val).collect();
            Val::List(Arc::new(items))
        }
        JsonValue::Object(obj) => {
            let mut map: HashMap<Key, Val> = HashMap::with_capacity(obj.len());
            for (k, v) in obj.iter() {
                map.insert(Key::from(k.clone()), json_to_val(v));
            }
            Val::Map(Map { map: Arc::new(map) })
        }
    }
}

/// Normalize an engine value into its host shape
///
/// Lists become arrays and maps become objects with stringified keys.
/// Bytes are base64 encoded, durations render as `"<seconds>s"` and
/// timestamps as RFC 3339.
///
/// # Errors
///
/// Returns [`ExprError::Conversion`] for values with no host shape:
/// non-finite doubles, durations beyond the nanosecond range and function
/// values.
pub fn val_to_json(value: &Val) -> Result<JsonValue> {
    let json = match value {
        Val::Null => JsonValue::Null,
        Val::Bool(b) => JsonValue::Bool(*b),
        Val::Int(i) => JsonValue::Number((*i).into()),
        Val::UInt(u) => JsonValue::Number((*u).into()),
        Val::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| ExprError::Conversion(format!("double {} has no JSON form", f)))?,
        Val::String(s) => JsonValue::String(s.to_string()),
        Val::Bytes(b) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b.as_slice()))
        }
        Val::List(list) => JsonValue::Array(list.iter().map(val_to_json).collect::<Result<_>>()?),
        Val::Map(map) => {
            let mut obj = serde_json::Map::with_capacity(map.map.len());
            for (k, v) in map.map.iter() {
                obj.insert(key_to_string(k), val_to_json(v)?);
            }
            JsonValue::Object(obj)
        }
        Val::Duration(d) => JsonValue::String(format_duration(d)?),
        Val::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        Val::Function(name, _) => {
            return Err(ExprError::Conversion(format!(
                "function '{}' is not a value",
                name
            )))
        }
    };
    Ok(json)
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}

fn format_duration(d: &chrono::Duration) -> Result<String> {
    let nanos = d
        .num_nanoseconds()
        .ok_or_else(|| ExprError::Conversion(format!("duration {} overflows nanoseconds", d)))?;
    if nanos % 1_000_000_000 == 0 {
        Ok(format!("{}s", nanos / 1_000_000_000))
    } else {
        Ok(format!("{}s", nanos as f64 / 1e9))
    }
}

/// Convert any serializable host value into an engine value
pub fn to_val<T: Serialize + ?Sized>(value: &T) -> Result<Val> {
    Ok(json_to_val(&serde_json::to_value(value)?))
}

/// Convert an engine value into a host type
///
/// Bindings receiving struct-like arguments use this to recover the
/// registered native type.
pub fn from_val<T: DeserializeOwned>(value: &Val) -> Result<T> {
    serde_json::from_value(val_to_json(value)?).map_err(|e| ExprError::Conversion(e.to_string()))
}

/// Runtime type name of an engine value, as shown in overload errors
pub(crate) fn type_name(value: &Val) -> &'static str {
    match value {
        Val::Null => "null_type",
        Val::Bool(_) => "bool",
        Val::Int(_) => "int",
        Val::UInt(_) => "uint",
        Val::Float(_) => "double",
        Val::String(_) => "string",
        Val::Bytes(_) => "bytes",
        Val::List(_) => "list",
        Val::Map(_) => "map",
        Val::Duration(_) => "google.protobuf.Duration",
        Val::Timestamp(_) => "google.protobuf.Timestamp",
        _ => "function",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    }

    #[test]
    fn test_json_to_val_scalars() {
        assert!(matches!(json_to_val(&json!(true)), Val::Bool(true)));
        assert!(matches!(json_to_val(&json!(42)), Val::Int(42)));
        assert!(matches!(json_to_val(&json!(u64::MAX)), Val::UInt(u64::MAX)));
        assert!(matches!(json_to_val(&json!(3.5)), Val::Float(f) if f == 3.5));
        assert!(matches!(json_to_val(&json!(null)), Val::Null));
    }

    #[test]
    fn test_json_to_val_containers() {
        if let Val::List(list) = json_to_val(&json!([1, 2, 3])) {
            assert_eq!(list.len(), 3);
        } else {
            panic!("Expected List");
        }

        if let Val::Map(map) = json_to_val(&json!({"key": "value"})) {
            assert_eq!(map.map.len(), 1);
        } else {
            panic!("Expected Map");
        }
    }

    #[test]
    fn test_val_to_json_stringifies_keys() {
        let mut map = HashMap::new();
        map.insert(Key::Int(1), Val::Int(10));
        map.insert(Key::Bool(true), Val::String(Arc::new("t".into())));
        let json = val_to_json(&Val::Map(Map { map: Arc::new(map) })).unwrap();
        assert_eq!(json, json!({"1": 10, "true": "t"}));
    }

    #[test]
    fn test_val_to_json_bytes_and_duration() {
        let bytes = Val::Bytes(Arc::new(b"hi".to_vec()));
        assert_eq!(val_to_json(&bytes).unwrap(), json!("aGk="));

        let duration = Val::Duration(chrono::Duration::seconds(90));
        assert_eq!(val_to_json(&duration).unwrap(), json!("90s"));

        let half = Val::Duration(chrono::Duration::milliseconds(1500));
        assert_eq!(val_to_json(&half).unwrap(), json!("1.5s"));
    }

    #[test]
    fn test_val_to_json_rejects_values_without_host_shape() {
        let nan = val_to_json(&Val::Float(f64::NAN)).unwrap_err();
        assert!(matches!(nan, ExprError::Conversion(_)));

        let nested = json_to_val(&json!({"a": [1.0]}));
        assert!(val_to_json(&nested).is_ok());
        let inf = Val::List(Arc::new(vec![Val::Float(f64::INFINITY)]));
        assert!(matches!(val_to_json(&inf), Err(ExprError::Conversion(_))));

        let long = Val::Duration(chrono::Duration::days(365 * 1000));
        assert!(matches!(val_to_json(&long), Err(ExprError::Conversion(_))));

        let function = Val::Function(Arc::new("size".into()), None);
        assert_eq!(
            val_to_json(&function).unwrap_err(),
            ExprError::Conversion("function 'size' is not a value".into())
        );
    }

    #[test]
    fn test_struct_round_trip() {
        let point = Point { x: 1.0, y: 2.5 };
        let val = to_val(&point).unwrap();
        assert_eq!(type_name(&val), "map");
        let back: Point = from_val(&val).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_from_val_mismatch() {
        let err = from_val::<Point>(&Val::Int(1)).unwrap_err();
        assert!(matches!(err, ExprError::Conversion(_)));
    }
}
