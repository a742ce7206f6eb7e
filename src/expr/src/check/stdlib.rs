//! Signatures of the engine's built-in operators and functions
//!
//! Only the shapes are declared here; the engine supplies the behavior.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::decls::Overload;
use crate::types::Type;

/// Names the facade handles itself and that declarations may not take
pub(crate) const RESERVED: [&str; 7] = ["has", "dyn", "all", "exists", "exists_one", "map", "filter"];

/// Comprehension macros taking an iteration variable
pub(crate) const COMPREHENSIONS: [&str; 5] = ["all", "exists", "exists_one", "map", "filter"];

/// A checkable signature, either built-in or taken from a declared overload
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Signature {
    pub args: Vec<Type>,
    pub result: Type,
    pub member: bool,
}

impl From<&Overload> for Signature {
    fn from(ov: &Overload) -> Self {
        Self {
            args: ov.args().to_vec(),
            result: ov.result().clone(),
            member: ov.is_member(),
        }
    }
}

fn global<const N: usize>(args: [Type; N], result: Type) -> Signature {
    Signature {
        args: args.into(),
        result,
        member: false,
    }
}

fn member<const N: usize>(args: [Type; N], result: Type) -> Signature {
    Signature {
        member: true,
        ..global(args, result)
    }
}

fn a() -> Type {
    Type::param("A")
}

fn b() -> Type {
    Type::param("B")
}

const NUMERIC: [Type; 3] = [Type::Int, Type::Uint, Type::Double];
const COMPARABLE: [Type; 8] = [
    Type::Int,
    Type::Uint,
    Type::Double,
    Type::String,
    Type::Bytes,
    Type::Bool,
    Type::Timestamp,
    Type::Duration,
];

fn same_type_pairs(types: &[Type], result: impl Fn(&Type) -> Type) -> Vec<Signature> {
    types
        .iter()
        .map(|t| global([t.clone(), t.clone()], result(t)))
        .collect()
}

pub(crate) static OPERATORS: Lazy<HashMap<&'static str, Vec<Signature>>> = Lazy::new(|| {
    let mut ops = HashMap::new();

    let mut add = same_type_pairs(&NUMERIC, Type::clone);
    add.extend(same_type_pairs(&[Type::String, Type::Bytes, Type::Duration], Type::clone));
    add.push(global([Type::list(a()), Type::list(a())], Type::list(a())));
    add.push(global([Type::Timestamp, Type::Duration], Type::Timestamp));
    add.push(global([Type::Duration, Type::Timestamp], Type::Timestamp));
    ops.insert("_+_", add);

    let mut sub = same_type_pairs(&NUMERIC, Type::clone);
    sub.push(global([Type::Duration, Type::Duration], Type::Duration));
    sub.push(global([Type::Timestamp, Type::Timestamp], Type::Duration));
    sub.push(global([Type::Timestamp, Type::Duration], Type::Timestamp));
    ops.insert("_-_", sub);

    ops.insert("_*_", same_type_pairs(&NUMERIC, Type::clone));
    ops.insert("_/_", same_type_pairs(&NUMERIC, Type::clone));
    ops.insert("_%_", same_type_pairs(&[Type::Int, Type::Uint], Type::clone));

    for op in ["_<_", "_<=_", "_>_", "_>=_"] {
        ops.insert(op, same_type_pairs(&COMPARABLE, |_| Type::Bool));
    }
    for op in ["_==_", "_!=_"] {
        ops.insert(op, vec![global([a(), a()], Type::Bool)]);
    }
    ops.insert(
        "@in",
        vec![
            global([a(), Type::list(a())], Type::Bool),
            global([a(), Type::map(a(), b())], Type::Bool),
        ],
    );

    ops.insert("!_", vec![global([Type::Bool], Type::Bool)]);
    ops.insert(
        "-_",
        vec![global([Type::Int], Type::Int), global([Type::Double], Type::Double)],
    );
    ops.insert("_&&_", vec![global([Type::Bool, Type::Bool], Type::Bool)]);
    ops.insert("_||_", vec![global([Type::Bool, Type::Bool], Type::Bool)]);
    ops.insert("_?_:_", vec![global([Type::Bool, a(), a()], a())]);
    ops.insert(
        "_[_]",
        vec![
            global([Type::list(a()), Type::Int], a()),
            global([Type::map(a(), b()), a()], b()),
        ],
    );

    ops
});

pub(crate) static FUNCTIONS: Lazy<HashMap<&'static str, Vec<Signature>>> = Lazy::new(|| {
    let mut fns = HashMap::new();

    let sized = [
        Type::String,
        Type::Bytes,
        Type::list(a()),
        Type::map(a(), b()),
    ];
    let mut size: Vec<Signature> = sized.iter().map(|t| global([t.clone()], Type::Int)).collect();
    size.extend(sized.iter().map(|t| member([t.clone()], Type::Int)));
    fns.insert("size", size);

    fns.insert(
        "contains",
        vec![
            member([Type::String, Type::String], Type::Bool),
            member([Type::list(a()), a()], Type::Bool),
            member([Type::map(a(), b()), a()], Type::Bool),
        ],
    );
    for name in ["startsWith", "endsWith"] {
        fns.insert(name, vec![member([Type::String, Type::String], Type::Bool)]);
    }
    fns.insert(
        "matches",
        vec![
            member([Type::String, Type::String], Type::Bool),
            global([Type::String, Type::String], Type::Bool),
        ],
    );

    let conversions: [(&str, Vec<Type>, Type); 7] = [
        (
            "int",
            vec![Type::Int, Type::Uint, Type::Double, Type::String, Type::Timestamp],
            Type::Int,
        ),
        ("uint", vec![Type::Int, Type::Uint, Type::Double, Type::String], Type::Uint),
        ("double", vec![Type::Int, Type::Uint, Type::Double, Type::String], Type::Double),
        (
            "string",
            vec![
                Type::Int,
                Type::Uint,
                Type::Double,
                Type::String,
                Type::Bytes,
                Type::Bool,
                Type::Timestamp,
                Type::Duration,
            ],
            Type::String,
        ),
        ("bytes", vec![Type::String, Type::Bytes], Type::Bytes),
        ("duration", vec![Type::String], Type::Duration),
        ("timestamp", vec![Type::String], Type::Timestamp),
    ];
    for (name, sources, target) in conversions {
        fns.insert(
            name,
            sources.into_iter().map(|s| global([s], target.clone())).collect(),
        );
    }

    // Variadic in the engine: the largest element of one list, or of the
    // arguments themselves
    let mut max = vec![global([Type::list(a())], a())];
    max.extend(COMPARABLE.iter().map(|t| global([t.clone()], t.clone())));
    max.extend((2..=MAX_ARITY).map(|n| Signature {
        args: vec![a(); n],
        result: a(),
        member: false,
    }));
    fns.insert("max", max);

    fns.insert("dyn", vec![global([a()], Type::Dyn)]);
    fns
});

/// Widest call of `max` the checker accepts
const MAX_ARITY: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_table() {
        assert_eq!(OPERATORS["_<_"].len(), COMPARABLE.len());
        assert!(OPERATORS["_%_"].iter().all(|s| s.args.len() == 2));
        assert_eq!(OPERATORS["_?_:_"][0].args.len(), 3);
    }

    #[test]
    fn test_function_table() {
        assert!(FUNCTIONS["size"].iter().any(|s| s.member));
        assert!(FUNCTIONS["size"].iter().any(|s| !s.member));
        assert_eq!(FUNCTIONS["dyn"][0].result, Type::Dyn);
        assert!(FUNCTIONS.keys().all(|name| !COMPREHENSIONS.contains(name)));
    }

    /// Every function `cel_interpreter::Context::default()` registers
    const ENGINE_FUNCTIONS: [&str; 19] = [
        "contains",
        "size",
        "has",
        "map",
        "filter",
        "all",
        "max",
        "startsWith",
        "endsWith",
        "matches",
        "duration",
        "timestamp",
        "string",
        "bytes",
        "double",
        "exists",
        "exists_one",
        "int",
        "uint",
    ];

    #[test]
    fn test_engine_functions_are_known() {
        for name in ENGINE_FUNCTIONS {
            assert!(
                FUNCTIONS.contains_key(name) || RESERVED.contains(&name),
                "engine function '{}' has no signature",
                name
            );
        }
    }

    #[test]
    fn test_max_signatures() {
        let max = &FUNCTIONS["max"];
        assert!(max.iter().any(|s| s.args == vec![Type::list(a())]));
        assert!(max.iter().any(|s| s.args == vec![Type::Int]));
        assert!(max.iter().any(|s| s.args.len() == MAX_ARITY));
    }
}
