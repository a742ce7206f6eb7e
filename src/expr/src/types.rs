//! Semantic types used by declarations and the checker

use std::fmt;

use indexmap::IndexMap;

/// A declared or inferred expression type
///
/// Display output follows the names CEL uses in diagnostics, e.g.
/// `map(string, dyn)` or `google.protobuf.Duration`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Any,
    Bool,
    Bytes,
    Double,
    Duration,
    Dyn,
    Int,
    Null,
    String,
    Timestamp,
    Type,
    Uint,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// A struct-like type registered through a [`TypeDescriptor`]
    Object(String),
    /// A type parameter bound during overload resolution
    Param(String),
    /// Result of a failed check; assignable everywhere to stop cascades
    #[doc(hidden)]
    Error,
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    /// `dyn`, `any` and the error type accept any argument
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dyn | Self::Any | Self::Error)
    }

    /// Names of object types referenced anywhere inside this type
    pub(crate) fn object_names(&self, out: &mut Vec<String>) {
        match self {
            Self::Object(name) => out.push(name.clone()),
            Self::List(elem) => elem.object_names(out),
            Self::Map(key, value) => {
                key.object_names(out);
                value.object_names(out);
            }
            _ => {}
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "google.protobuf.Any"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes => write!(f, "bytes"),
            Self::Double => write!(f, "double"),
            Self::Duration => write!(f, "google.protobuf.Duration"),
            Self::Dyn => write!(f, "dyn"),
            Self::Int => write!(f, "int"),
            Self::Null => write!(f, "null_type"),
            Self::String => write!(f, "string"),
            Self::Timestamp => write!(f, "google.protobuf.Timestamp"),
            Self::Type => write!(f, "type"),
            Self::Uint => write!(f, "uint"),
            Self::List(elem) => write!(f, "list({})", elem),
            Self::Map(key, value) => write!(f, "map({}, {})", key, value),
            Self::Object(name) | Self::Param(name) => write!(f, "{}", name),
            Self::Error => write!(f, "*error*"),
        }
    }
}

/// Describes a struct-like native type: a name and typed fields
///
/// Values of a described type are bound as maps (through serde), so field
/// selection works at runtime while the checker validates field names and
/// types at compile time.
///
/// # Examples
///
/// ```
/// use cel_expr::{Type, TypeDescriptor};
///
/// let point = TypeDescriptor::new("testdata.Point")
///     .field("X", Type::Double)
///     .field("Y", Type::Double);
/// assert_eq!(point.field_type("X"), Some(&Type::Double));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: String,
    fields: IndexMap<String, Type>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field declaration
    pub fn field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The object type naming this descriptor
    pub fn as_type(&self) -> Type {
        Type::Object(self.name.clone())
    }
}

/// Implemented by host types that can be registered with an environment
pub trait NativeType {
    fn descriptor() -> TypeDescriptor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::map(Type::String, Type::Dyn).to_string(), "map(string, dyn)");
        assert_eq!(Type::list(Type::Int).to_string(), "list(int)");
        assert_eq!(Type::Null.to_string(), "null_type");
        assert_eq!(Type::object("testdata.Point").to_string(), "testdata.Point");
    }

    #[test]
    fn test_object_names() {
        let ty = Type::map(Type::String, Type::list(Type::object("a.B")));
        let mut names = Vec::new();
        ty.object_names(&mut names);
        assert_eq!(names, vec!["a.B".to_string()]);
    }

    #[test]
    fn test_descriptor_fields_keep_order() {
        let desc = TypeDescriptor::new("r")
            .field("b", Type::Int)
            .field("a", Type::String);
        let names: Vec<_> = desc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(desc.field_type("c"), None);
    }
}
