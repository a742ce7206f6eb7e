//! Declarations: variables, functions with typed overloads, and types

use std::fmt;
use std::sync::Arc;

use crate::convert::{Val, ValResult};
use crate::types::{NativeType, Type, TypeDescriptor};

/// Name of the conventional subject variable
pub const THIS: &str = "this";

/// Native implementation of a one-argument overload
pub type UnaryOp = Arc<dyn Fn(&Val) -> ValResult + Send + Sync>;
/// Native implementation of a two-argument overload
pub type BinaryOp = Arc<dyn Fn(&Val, &Val) -> ValResult + Send + Sync>;
/// Native implementation of an overload with any number of arguments
pub type FunctionOp = Arc<dyn Fn(&[Val]) -> ValResult + Send + Sync>;

/// Native implementation attached to an overload
#[derive(Clone)]
pub enum Binding {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Function(FunctionOp),
}

impl Binding {
    /// Number of arguments the binding accepts, `None` when variadic
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Unary(_) => Some(1),
            Self::Binary(_) => Some(2),
            Self::Function(_) => None,
        }
    }

    pub(crate) fn call(&self, args: &[Val]) -> ValResult {
        match (self, args) {
            (Self::Unary(op), [arg]) => op(arg),
            (Self::Binary(op), [lhs, rhs]) => op(lhs, rhs),
            (Self::Function(op), args) => op(args),
            _ => Err(crate::convert::new_err(format!(
                "binding expects {} argument(s), got {}",
                self.arity().unwrap_or_default(),
                args.len()
            ))),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary(_) => write!(f, "Binding::Unary"),
            Self::Binary(_) => write!(f, "Binding::Binary"),
            Self::Function(_) => write!(f, "Binding::Function"),
        }
    }
}

pub fn unary_binding<F>(op: F) -> Binding
where
    F: Fn(&Val) -> ValResult + Send + Sync + 'static,
{
    Binding::Unary(Arc::new(op))
}

pub fn binary_binding<F>(op: F) -> Binding
where
    F: Fn(&Val, &Val) -> ValResult + Send + Sync + 'static,
{
    Binding::Binary(Arc::new(op))
}

pub fn function_binding<F>(op: F) -> Binding
where
    F: Fn(&[Val]) -> ValResult + Send + Sync + 'static,
{
    Binding::Function(Arc::new(op))
}

/// One typed signature of a function
///
/// Member overloads take their receiver as the first argument type, so
/// `a.f(b)` matches `[type_of(a), type_of(b)]`.
#[derive(Debug, Clone)]
pub struct Overload {
    id: String,
    args: Vec<Type>,
    result: Type,
    member: bool,
    binding: Binding,
}

impl Overload {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn args(&self) -> &[Type] {
        &self.args
    }

    pub fn result(&self) -> &Type {
        &self.result
    }

    pub fn is_member(&self) -> bool {
        self.member
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Same call style and argument types
    pub(crate) fn same_signature(&self, other: &Overload) -> bool {
        self.member == other.member && self.args == other.args && self.result == other.result
    }

    pub(crate) fn overlaps(&self, other: &Overload) -> bool {
        self.member == other.member && self.args == other.args
    }
}

/// Declare a global overload: `f(args...)`
pub fn overload<I>(id: impl Into<String>, args: I, result: Type, binding: Binding) -> Overload
where
    I: IntoIterator<Item = Type>,
{
    Overload {
        id: id.into(),
        args: args.into_iter().collect(),
        result,
        member: false,
        binding,
    }
}

/// Declare a member overload: `receiver.f(args...)`
pub fn member_overload<I>(id: impl Into<String>, args: I, result: Type, binding: Binding) -> Overload
where
    I: IntoIterator<Item = Type>,
{
    Overload {
        member: true,
        ..overload(id, args, result, binding)
    }
}

/// A named function and its overload set
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    name: String,
    overloads: Vec<Overload>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, overloads: Vec<Overload>) -> Self {
        Self {
            name: name.into(),
            overloads,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    pub(crate) fn overloads_mut(&mut self) -> &mut Vec<Overload> {
        &mut self.overloads
    }
}

/// A single environment declaration
#[derive(Debug, Clone)]
pub enum Declaration {
    Variable { name: String, ty: Type },
    Function(FunctionDecl),
    Types(Vec<TypeDescriptor>),
}

/// Declare a variable of the given type
pub fn variable(name: impl Into<String>, ty: Type) -> Declaration {
    Declaration::Variable {
        name: name.into(),
        ty,
    }
}

/// Declare a function with one or more overloads
pub fn function<I>(name: impl Into<String>, overloads: I) -> Declaration
where
    I: IntoIterator<Item = Overload>,
{
    Declaration::Function(FunctionDecl::new(name, overloads.into_iter().collect()))
}

/// Register struct-like type descriptors
pub fn types<I>(descriptors: I) -> Declaration
where
    I: IntoIterator<Item = TypeDescriptor>,
{
    Declaration::Types(descriptors.into_iter().collect())
}

/// Register the descriptor of a host type
pub fn native_type<T: NativeType>() -> Declaration {
    Declaration::Types(vec![T::descriptor()])
}

/// Declare `this` as `map(string, dyn)` so expressions can address a
/// loosely-typed record without a per-expression schema
pub fn use_this_variable() -> Declaration {
    variable(THIS, Type::map(Type::String, Type::Dyn))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Binding {
        unary_binding(|v| Ok(v.clone()))
    }

    #[test]
    fn test_binding_arity() {
        assert_eq!(identity().arity(), Some(1));
        assert_eq!(binary_binding(|a, _| Ok(a.clone())).arity(), Some(2));
        assert_eq!(function_binding(|_| Ok(Val::Null)).arity(), None);
    }

    #[test]
    fn test_binding_call_checks_argument_count() {
        let binding = identity();
        assert!(matches!(binding.call(&[Val::Int(1)]), Ok(Val::Int(1))));
        assert!(binding.call(&[Val::Int(1), Val::Int(2)]).is_err());
    }

    #[test]
    fn test_member_overload() {
        let ov = member_overload("a_b", [Type::String], Type::Bool, identity());
        assert!(ov.is_member());
        assert_eq!(ov.args(), &[Type::String]);
        let global = overload("a_b", [Type::String], Type::Bool, identity());
        assert!(!ov.overlaps(&global));
        assert!(!ov.same_signature(&global));
    }

    #[test]
    fn test_use_this_variable() {
        match use_this_variable() {
            Declaration::Variable { name, ty } => {
                assert_eq!(name, THIS);
                assert_eq!(ty, Type::map(Type::String, Type::Dyn));
            }
            other => panic!("unexpected declaration: {:?}", other),
        }
    }
}
