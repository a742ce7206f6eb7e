//! Declaration and overload checking over the engine's expression tree
//!
//! The tree is walked left to right so that [`Spans`] can hand out the
//! location of each token the walk reports against.

use std::collections::HashMap;

use cel_parser::{ArithmeticOp, Atom, Expression, Member, RelationOp, UnaryOp};

use super::diagnostic::{Diagnostic, Diagnostics, Location};
use super::lexer::{Spans, Token};
use super::stdlib::{Signature, COMPREHENSIONS, FUNCTIONS, OPERATORS};
use crate::env::Env;
use crate::types::Type;

pub(crate) struct Checker<'a> {
    env: &'a Env,
    source: &'a str,
    spans: Spans<'a>,
    /// Comprehension variables, innermost last
    scopes: Vec<HashMap<String, Type>>,
    diagnostics: Diagnostics,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(env: &'a Env, source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            env,
            source,
            spans: Spans::new(tokens),
            scopes: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Check a whole expression, returning its type and any diagnostics
    pub(crate) fn run(mut self, expr: &Expression) -> (Type, Diagnostics) {
        let ty = self.check(expr);
        (ty, self.diagnostics.sorted())
    }

    fn report(&mut self, location: Location, message: impl Into<String>) -> Type {
        self.diagnostics
            .push(Diagnostic::new(self.source, location, message));
        Type::Error
    }

    fn check(&mut self, expr: &Expression) -> Type {
        match expr {
            Expression::Atom(atom) => self.check_atom(atom),
            Expression::Ident(name) => {
                let loc = self.spans.next(name);
                self.resolve_ident(name, loc)
            }
            Expression::Arithmetic(lhs, op, rhs) => {
                let (name, token) = match op {
                    ArithmeticOp::Add => ("_+_", "+"),
                    ArithmeticOp::Subtract => ("_-_", "-"),
                    ArithmeticOp::Multiply => ("_*_", "*"),
                    ArithmeticOp::Divide => ("_/_", "/"),
                    ArithmeticOp::Modulus => ("_%_", "%"),
                };
                self.check_binary(name, token, lhs, rhs)
            }
            Expression::Relation(lhs, op, rhs) => {
                let (name, token) = match op {
                    RelationOp::LessThan => ("_<_", "<"),
                    RelationOp::LessThanEq => ("_<=_", "<="),
                    RelationOp::GreaterThan => ("_>_", ">"),
                    RelationOp::GreaterThanEq => ("_>=_", ">="),
                    RelationOp::Equals => ("_==_", "=="),
                    RelationOp::NotEquals => ("_!=_", "!="),
                    RelationOp::In => ("@in", "in"),
                };
                self.check_binary(name, token, lhs, rhs)
            }
            Expression::And(lhs, rhs) => self.check_binary("_&&_", "&&", lhs, rhs),
            Expression::Or(lhs, rhs) => self.check_binary("_||_", "||", lhs, rhs),
            Expression::Ternary(cond, then, otherwise) => {
                let cond_ty = self.check(cond);
                let loc = self.spans.next("?");
                let then_ty = self.check(then);
                self.spans.next(":");
                let else_ty = self.check(otherwise);
                self.resolve_operator("_?_:_", &[cond_ty, then_ty, else_ty], loc)
            }
            Expression::Unary(op, operand) => match op {
                UnaryOp::Not => {
                    let loc = self.spans.next("!");
                    let ty = self.check(operand);
                    self.resolve_operator("!_", &[ty], loc)
                }
                UnaryOp::Minus => {
                    let loc = self.spans.next("-");
                    let ty = self.check(operand);
                    self.resolve_operator("-_", &[ty], loc)
                }
                // Doubled operators cancel out
                _ => self.check(operand),
            },
            Expression::Member(operand, member) => self.check_member(operand, member),
            Expression::FunctionCall(name, target, args) => {
                self.check_call(name, target.as_deref(), args)
            }
            Expression::List(items) => {
                self.spans.next("[");
                let types: Vec<Type> = items.iter().map(|item| self.check(item)).collect();
                Type::list(join(types))
            }
            Expression::Map(entries) => {
                self.spans.next("{");
                let mut keys = Vec::with_capacity(entries.len());
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    keys.push(self.check(key));
                    self.spans.next(":");
                    values.push(self.check(value));
                }
                Type::map(join(keys), join(values))
            }
        }
    }

    fn check_atom(&mut self, atom: &Atom) -> Type {
        match atom {
            Atom::Int(_) => Type::Int,
            Atom::UInt(_) => Type::Uint,
            Atom::Float(_) => Type::Double,
            Atom::String(_) => Type::String,
            Atom::Bytes(_) => Type::Bytes,
            Atom::Bool(b) => {
                self.spans.next(if *b { "true" } else { "false" });
                Type::Bool
            }
            Atom::Null => {
                self.spans.next("null");
                Type::Null
            }
        }
    }

    fn resolve_ident(&mut self, name: &str, loc: Location) -> Type {
        if let Some(ty) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return ty.clone();
        }
        match self.env.variable(name) {
            Some(ty) => ty.clone(),
            None => self.report(
                loc,
                format!("undeclared reference to '{}' (in container '')", name),
            ),
        }
    }

    fn check_binary(&mut self, name: &str, token: &str, lhs: &Expression, rhs: &Expression) -> Type {
        let lhs_ty = self.check(lhs);
        let loc = self.spans.next(token);
        let rhs_ty = self.check(rhs);
        self.resolve_operator(name, &[lhs_ty, rhs_ty], loc)
    }

    fn check_member(&mut self, operand: &Expression, member: &Member) -> Type {
        let operand_ty = self.check(operand);
        match member {
            Member::Attribute(field) => {
                let loc = self.spans.next(".");
                self.spans.next(field);
                self.select_field(&operand_ty, field, loc)
            }
            Member::Index(index) => {
                let loc = self.spans.next("[");
                let index_ty = self.check(index);
                self.resolve_operator("_[_]", &[operand_ty, index_ty], loc)
            }
            Member::Fields(fields) => {
                let loc = self.spans.next("{");
                for (field, value) in fields {
                    self.spans.next(field);
                    self.spans.next(":");
                    self.check(value);
                }
                self.report(loc, "message construction is not supported")
            }
        }
    }

    fn select_field(&mut self, operand: &Type, field: &str, loc: Location) -> Type {
        match operand {
            Type::Map(_, value) => value.as_ref().clone(),
            Type::Object(name) => {
                let found = self
                    .env
                    .type_descriptor(name)
                    .and_then(|desc| desc.field_type(field))
                    .cloned();
                match found {
                    Some(ty) => ty,
                    None => self.report(loc, format!("undefined field '{}'", field)),
                }
            }
            Type::Error => Type::Error,
            ty if ty.is_dynamic() || matches!(ty, Type::Param(_)) => Type::Dyn,
            other => self.report(
                loc,
                format!("type '{}' does not support field selection", other),
            ),
        }
    }

    fn check_call(&mut self, name: &Expression, target: Option<&Expression>, args: &[Expression]) -> Type {
        let Expression::Ident(name) = name else {
            return Type::Dyn;
        };
        let name = name.as_str();

        let target_ty = target.map(|t| {
            let ty = self.check(t);
            self.spans.next(".");
            ty
        });
        let loc = self.spans.next_call(name);

        if target.is_none() && name == "has" && args.len() == 1 {
            return self.check_has(&args[0], loc);
        }
        if let Some(range_ty) = &target_ty {
            if COMPREHENSIONS.contains(&name) && matches!(args.len(), 2 | 3) {
                return self.check_comprehension(name, range_ty, args, loc);
            }
        }
        if target.is_none() && name == "dyn" && args.len() == 1 {
            self.check(&args[0]);
            return Type::Dyn;
        }

        let mut arg_types: Vec<Type> = target_ty.into_iter().collect();
        arg_types.extend(args.iter().map(|arg| self.check(arg)));

        let signatures: Vec<Signature> = match self.env.function(name) {
            Some(decl) => decl.overloads().iter().map(Signature::from).collect(),
            None => match FUNCTIONS.get(name) {
                Some(sigs) => sigs.clone(),
                None => {
                    return self.report(
                        loc,
                        format!("undeclared reference to '{}' (in container '')", name),
                    )
                }
            },
        };
        self.resolve(name, &signatures, &arg_types, target.is_some(), loc)
    }

    fn check_has(&mut self, arg: &Expression, loc: Location) -> Type {
        if !matches!(arg, Expression::Member(_, member) if matches!(**member, Member::Attribute(_))) {
            self.check(arg);
            return self.report(loc, "invalid argument to has() macro");
        }
        match self.check(arg) {
            Type::Error => Type::Error,
            _ => Type::Bool,
        }
    }

    fn check_comprehension(&mut self, name: &str, range: &Type, args: &[Expression], loc: Location) -> Type {
        let Expression::Ident(var) = &args[0] else {
            args.iter().for_each(|arg| {
                self.check(arg);
            });
            return self.report(loc, "argument must be a simple name");
        };
        self.spans.next(var);

        let elem = match range {
            Type::List(elem) => elem.as_ref().clone(),
            Type::Map(key, _) => key.as_ref().clone(),
            Type::Error => Type::Error,
            ty if ty.is_dynamic() || matches!(ty, Type::Param(_)) => Type::Dyn,
            other => {
                return self.report(
                    loc,
                    format!("expression of type '{}' cannot be range of a comprehension", other),
                )
            }
        };

        let mut scope = HashMap::new();
        scope.insert(var.to_string(), elem.clone());
        self.scopes.push(scope);
        let body: Vec<Type> = args[1..].iter().map(|arg| self.check(arg)).collect();
        self.scopes.pop();

        let predicates = if name == "map" { &body[..body.len() - 1] } else { &body[..] };
        for ty in predicates {
            if !assignable(&Type::Bool, ty) {
                return self.report(
                    loc,
                    format!("found no matching overload for '{}' applied to '({})'", name, ty),
                );
            }
        }

        match name {
            "map" => Type::list(body.last().cloned().unwrap_or(Type::Dyn)),
            "filter" => Type::list(elem),
            _ => Type::Bool,
        }
    }

    fn resolve_operator(&mut self, name: &str, args: &[Type], loc: Location) -> Type {
        match OPERATORS.get(name) {
            Some(sigs) => self.resolve(name, sigs, args, false, loc),
            None => Type::Dyn,
        }
    }

    /// Pick the result type of the overloads accepting `args`
    fn resolve(&mut self, name: &str, sigs: &[Signature], args: &[Type], member: bool, loc: Location) -> Type {
        let mut results: Vec<Type> = Vec::new();
        for sig in sigs.iter().filter(|s| s.member == member && s.args.len() == args.len()) {
            let mut bindings = HashMap::new();
            if sig.args.iter().zip(args).all(|(p, a)| unify(p, a, &mut bindings)) {
                let result = substitute(&sig.result, &bindings);
                if !results.contains(&result) {
                    results.push(result);
                }
            }
        }

        match results.len() {
            1 => results.remove(0),
            0 if args.iter().any(|a| *a == Type::Error) => Type::Error,
            0 => {
                let rendered = render_args(args, member);
                self.report(
                    loc,
                    format!("found no matching overload for '{}' applied to '{}'", name, rendered),
                )
            }
            _ => Type::Dyn,
        }
    }
}

fn render_args(args: &[Type], member: bool) -> String {
    let joined = |types: &[Type]| {
        types
            .iter()
            .map(Type::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match args.split_first() {
        Some((receiver, rest)) if member => format!("{}.({})", receiver, joined(rest)),
        _ => format!("({})", joined(args)),
    }
}

/// Bind type parameters in `param` so that it accepts `arg`
fn unify(param: &Type, arg: &Type, bindings: &mut HashMap<String, Type>) -> bool {
    if arg.is_dynamic() {
        return true;
    }
    match (param, arg) {
        (p, _) if p.is_dynamic() => true,
        (Type::Param(name), _) => match bindings.get(name).cloned() {
            Some(bound) if bound.is_dynamic() => {
                bindings.insert(name.clone(), arg.clone());
                true
            }
            Some(bound) => unify(&bound, arg, bindings),
            None => {
                bindings.insert(name.clone(), arg.clone());
                true
            }
        },
        (Type::List(p), Type::List(a)) => unify(p, a, bindings),
        (Type::Map(pk, pv), Type::Map(ak, av)) => unify(pk, ak, bindings) && unify(pv, av, bindings),
        (Type::Object(_), Type::Null) => true,
        _ => param == arg,
    }
}

fn substitute(ty: &Type, bindings: &HashMap<String, Type>) -> Type {
    match ty {
        Type::Param(name) => bindings.get(name).cloned().unwrap_or(Type::Dyn),
        Type::List(elem) => Type::list(substitute(elem, bindings)),
        Type::Map(key, value) => Type::map(substitute(key, bindings), substitute(value, bindings)),
        other => other.clone(),
    }
}

fn assignable(target: &Type, ty: &Type) -> bool {
    unify(target, ty, &mut HashMap::new())
}

/// Common type of literal elements, `dyn` when they disagree
fn join(types: Vec<Type>) -> Type {
    let mut known = types.into_iter().filter(|t| *t != Type::Error);
    match known.next() {
        Some(first) if known.all(|t| t == first) => first,
        _ => Type::Dyn,
    }
}
