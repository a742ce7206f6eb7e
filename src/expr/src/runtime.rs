//! Evaluation against the wrapped engine
//!
//! Checked trees are lowered once into the tree the engine runs. Every
//! evaluation then builds its own engine context from the activation, so
//! compiled expressions hold no per-call state and can be shared across
//! threads. Declared functions are registered as dispatchers that pick an
//! overload by runtime argument types and call its binding.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, ExecutionError, FunctionContext};
use cel_parser::{Atom, Expression, Member};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::activation::Activation;
use crate::convert::{new_err, type_name, Val, ValResult};
use crate::decls::FunctionDecl;
use crate::error::{ExprError, Result};
use crate::types::Type;

/// Field selection; the `@` prefix keeps it out of reach of source text
const SELECT: &str = "@select";
/// Index selection
const INDEX: &str = "@index";

/// First facade-level failure of one evaluation
///
/// The engine only carries its own error type through a call, so a
/// dispatcher records the precise error here before unwinding with a
/// generic one.
type FaultSlot = Arc<OnceCell<ExprError>>;

/// Rewrite a checked tree into the tree the engine runs
///
/// `a && b` becomes `a ? b : false`, so `b` only runs once `a` holds.
/// Field and index selection become calls to facade functions that report
/// absent keys as `NoSuchKey`.
pub(crate) fn lower(expr: &Expression) -> Expression {
    match expr {
        Expression::And(lhs, rhs) => Expression::Ternary(
            lower_boxed(lhs),
            lower_boxed(rhs),
            Box::new(Expression::Atom(Atom::Bool(false))),
        ),
        Expression::Or(lhs, rhs) => Expression::Or(lower_boxed(lhs), lower_boxed(rhs)),
        Expression::Ternary(cond, then, otherwise) => {
            Expression::Ternary(lower_boxed(cond), lower_boxed(then), lower_boxed(otherwise))
        }
        Expression::Arithmetic(lhs, op, rhs) => {
            Expression::Arithmetic(lower_boxed(lhs), op.clone(), lower_boxed(rhs))
        }
        Expression::Relation(lhs, op, rhs) => {
            Expression::Relation(lower_boxed(lhs), op.clone(), lower_boxed(rhs))
        }
        Expression::Unary(op, operand) => Expression::Unary(op.clone(), lower_boxed(operand)),
        Expression::Member(target, member) => match member.as_ref() {
            Member::Attribute(field) => call(
                SELECT,
                vec![lower(target), Expression::Atom(Atom::String(field.clone()))],
            ),
            Member::Index(index) => call(INDEX, vec![lower(target), lower(index)]),
            Member::Fields(_) => expr.clone(),
        },
        Expression::FunctionCall(name, target, args) => Expression::FunctionCall(
            name.clone(),
            target.as_deref().map(lower_boxed),
            args.iter().map(lower).collect(),
        ),
        Expression::List(items) => Expression::List(items.iter().map(lower).collect()),
        Expression::Map(entries) => Expression::Map(
            entries
                .iter()
                .map(|(key, value)| (lower(key), lower(value)))
                .collect(),
        ),
        Expression::Atom(_) | Expression::Ident(_) => expr.clone(),
    }
}

fn lower_boxed(expr: &Expression) -> Box<Expression> {
    Box::new(lower(expr))
}

fn call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall(
        Box::new(Expression::Ident(Arc::new(name.to_string()))),
        None,
        args,
    )
}

/// Run a lowered tree with the bindings of `input`
pub(crate) fn execute(
    ast: &Expression,
    functions: &[Arc<FunctionDecl>],
    input: &Activation,
) -> Result<Val> {
    let deadline = input.deadline();
    if expired(deadline) {
        warn!("Deadline expired before evaluation started");
        return Err(ExprError::Interrupted);
    }

    let fault: FaultSlot = Arc::new(OnceCell::new());
    let mut ctx = Context::default();
    for (name, value) in input.variables() {
        ctx.add_variable_from_value(name.clone(), value.clone());
    }
    ctx.add_function("has", has);
    ctx.add_function("dyn", dyn_identity);
    {
        let fault = fault.clone();
        ctx.add_function(SELECT, move |ftx: &FunctionContext| -> ValResult {
            select(ftx, &fault)
        });
    }
    {
        let fault = fault.clone();
        ctx.add_function(INDEX, move |ftx: &FunctionContext| -> ValResult {
            index(ftx, &fault)
        });
    }
    for decl in functions {
        let name = decl.name().to_string();
        let decl = decl.clone();
        let fault = fault.clone();
        ctx.add_function(&name, move |ftx: &FunctionContext| -> ValResult {
            dispatch(&decl, ftx, deadline, &fault)
        });
    }

    match panic::catch_unwind(AssertUnwindSafe(|| ctx.resolve(ast))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(fault.get().cloned().unwrap_or_else(|| map_error(err))),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Engine panicked during evaluation: {}", message);
            Err(ExprError::Internal(message))
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

/// Presence test that turns missing keys and variables into `false`
fn has(ftx: &FunctionContext) -> ValResult {
    let [arg] = ftx.args.as_slice() else {
        return Err(new_err("has() takes exactly one argument"));
    };
    match ftx.ptx.resolve(arg) {
        Ok(_) => Ok(Val::Bool(true)),
        Err(ExecutionError::NoSuchKey(_)) | Err(ExecutionError::UndeclaredReference(_)) => {
            Ok(Val::Bool(false))
        }
        Err(err) => Err(err),
    }
}

fn dyn_identity(ftx: &FunctionContext) -> ValResult {
    let [arg] = ftx.args.as_slice() else {
        return Err(new_err("dyn() takes exactly one argument"));
    };
    ftx.ptx.resolve(arg)
}

/// `target.field` on maps and registered objects
fn select(ftx: &FunctionContext, fault: &FaultSlot) -> ValResult {
    let [target, Expression::Atom(Atom::String(field))] = ftx.args.as_slice() else {
        return Err(new_err("malformed field selection"));
    };
    match ftx.ptx.resolve(target)? {
        Val::Map(map) => map
            .map
            .get(&Key::String(field.clone()))
            .cloned()
            .ok_or_else(|| ExecutionError::NoSuchKey(field.clone())),
        other => Err(raise(
            fault,
            ExprError::Evaluation(format!(
                "type '{}' does not support field selection",
                type_name(&other)
            )),
        )),
    }
}

/// `target[index]` on lists and maps
fn index(ftx: &FunctionContext, fault: &FaultSlot) -> ValResult {
    let [target, index] = ftx.args.as_slice() else {
        return Err(new_err("malformed index"));
    };
    let target = ftx.ptx.resolve(target)?;
    let index = ftx.ptx.resolve(index)?;

    match (&target, &index) {
        (Val::List(items), Val::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|at| items.get(at))
            .cloned()
            .ok_or_else(|| {
                raise(
                    fault,
                    ExprError::Evaluation(format!(
                        "index '{}' out of range in list size '{}'",
                        i,
                        items.len()
                    )),
                )
            }),
        (Val::Map(map), key) => {
            let key = match key {
                Val::String(s) => Key::String(s.clone()),
                Val::Int(i) => Key::Int(*i),
                Val::UInt(u) => Key::Uint(*u),
                Val::Bool(b) => Key::Bool(*b),
                _ => return Err(raise(fault, index_mismatch(&target, &index))),
            };
            map.map.get(&key).cloned().ok_or_else(|| {
                let rendered = match &key {
                    Key::String(s) => s.clone(),
                    Key::Int(i) => Arc::new(i.to_string()),
                    Key::Uint(u) => Arc::new(u.to_string()),
                    Key::Bool(b) => Arc::new(b.to_string()),
                };
                ExecutionError::NoSuchKey(rendered)
            })
        }
        _ => Err(raise(fault, index_mismatch(&target, &index))),
    }
}

fn index_mismatch(target: &Val, index: &Val) -> ExprError {
    ExprError::NoMatchingOverload {
        function: "_[_]".to_string(),
        args: format!("{}, {}", type_name(target), type_name(index)),
    }
}

fn dispatch(
    decl: &FunctionDecl,
    ftx: &FunctionContext,
    deadline: Option<Instant>,
    fault: &FaultSlot,
) -> ValResult {
    let member = ftx.this.is_some();
    let mut args: Vec<Val> = Vec::with_capacity(ftx.args.len() + 1);
    args.extend(ftx.this.iter().cloned());
    for arg in &ftx.args {
        args.push(ftx.ptx.resolve(arg)?);
    }

    if expired(deadline) {
        warn!("Deadline expired before calling '{}'", decl.name());
        return Err(raise(fault, ExprError::Interrupted));
    }

    let overload = decl.overloads().iter().find(|ov| {
        ov.is_member() == member
            && ov.args().len() == args.len()
            && ov.args().iter().zip(&args).all(|(ty, val)| accepts(ty, val))
    });
    let Some(overload) = overload else {
        let types: Vec<&str> = args.iter().map(type_name).collect();
        return Err(raise(
            fault,
            ExprError::NoMatchingOverload {
                function: decl.name().to_string(),
                args: types.join(", "),
            },
        ));
    };

    match panic::catch_unwind(AssertUnwindSafe(|| overload.binding().call(&args))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ExecutionError::FunctionError { message, .. })) => Err(raise(
            fault,
            ExprError::Function {
                function: decl.name().to_string(),
                message,
            },
        )),
        Ok(Err(err)) => Err(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Binding '{}' of '{}' panicked: {}", overload.id(), decl.name(), message);
            Err(raise(fault, ExprError::Internal(message)))
        }
    }
}

/// Record `err` for the caller and return an engine error to unwind with
fn raise(fault: &FaultSlot, err: ExprError) -> ExecutionError {
    let unwind = new_err(err.to_string());
    let _ = fault.set(err);
    unwind
}

fn map_error(err: ExecutionError) -> ExprError {
    match err {
        ExecutionError::NoSuchKey(key) => ExprError::NoSuchKey(key.to_string()),
        ExecutionError::UndeclaredReference(name) => ExprError::NoSuchAttribute(name.to_string()),
        ExecutionError::FunctionError { function, message } => {
            ExprError::Function { function, message }
        }
        other => ExprError::Evaluation(other.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Whether a runtime value fits a declared argument type
fn accepts(ty: &Type, value: &Val) -> bool {
    match (ty, value) {
        (t, _) if t.is_dynamic() => true,
        (Type::Param(_), _) => true,
        (Type::Bool, Val::Bool(_))
        | (Type::Int, Val::Int(_))
        | (Type::Uint, Val::UInt(_))
        | (Type::Double, Val::Float(_))
        | (Type::String, Val::String(_))
        | (Type::Bytes, Val::Bytes(_))
        | (Type::Null, Val::Null)
        | (Type::Duration, Val::Duration(_))
        | (Type::Timestamp, Val::Timestamp(_)) => true,
        (Type::List(elem), Val::List(items)) => items.iter().all(|item| accepts(elem, item)),
        (Type::Map(key, value), Val::Map(map)) => map
            .map
            .iter()
            .all(|(k, v)| accepts_key(key, k) && accepts(value, v)),
        (Type::Object(_), Val::Map(_)) => true,
        _ => false,
    }
}

fn accepts_key(ty: &Type, key: &Key) -> bool {
    matches!(
        (ty, key),
        (Type::Dyn | Type::Any | Type::Param(_), _)
            | (Type::String, Key::String(_))
            | (Type::Int, Key::Int(_))
            | (Type::Uint, Key::Uint(_))
            | (Type::Bool, Key::Bool(_))
    )
}
