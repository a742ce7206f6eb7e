//! # cel-expr
//!
//! Embeddable Common Expression Language (CEL) expressions on top of the
//! `cel-interpreter` engine.
//!
//! ## Features
//!
//! - **Typed environments** built from variable, function and type
//!   declarations, extendable without touching the parent
//! - **Checked compilation** with cel-go style caret diagnostics
//! - **Native bindings** dispatched by runtime argument types, with panics
//!   and explicit errors reported as typed evaluation errors
//! - **Host-shaped results** as `serde_json::Value` or any `DeserializeOwned` type
//! - **The `this` convention** for addressing a loosely-typed record
//!
//! ## Example
//!
//! ```rust
//! use cel_expr::{function, overload, unary_binding, use_this_variable, variable};
//! use cel_expr::{Activation, Env, Type};
//! use serde_json::json;
//!
//! let env = Env::new([use_this_variable()]).unwrap();
//! let env = env
//!     .extend([
//!         variable("v", Type::Int),
//!         function(
//!             "ret",
//!             [overload("ret_int", [Type::Int], Type::Int, unary_binding(|v| Ok(v.clone())))],
//!         ),
//!     ])
//!     .unwrap();
//!
//! let expr = env.compile("ret(v) + size(this)").unwrap();
//! let input = Activation::new()
//!     .bind("v", &40)
//!     .unwrap()
//!     .bind("this", &json!({"a": 1, "b": 2}))
//!     .unwrap();
//!
//! assert_eq!(expr.eval(&input).unwrap(), json!(42));
//! ```

pub mod activation;
pub mod cache;
pub mod check;
pub mod convert;
pub mod decls;
pub mod env;
pub mod error;
pub mod program;
mod runtime;
pub mod types;

// Re-export commonly used types
pub use activation::{wrap_this, Activation};
pub use cache::{CacheStats, ExprCache};
pub use check::{Diagnostic, Diagnostics, Location};
pub use convert::{from_val, json_to_val, new_err, to_val, val_to_json, Val, ValResult};
pub use decls::{
    binary_binding, function, function_binding, member_overload, native_type, overload, types,
    unary_binding, use_this_variable, variable, Binding, Declaration, FunctionDecl, Overload,
    THIS,
};
pub use env::{default_env, Env, EnvConfig};
pub use error::{ExprError, Result};
pub use program::Expr;
pub use types::{NativeType, Type, TypeDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
