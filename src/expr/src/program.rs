//! Compiled expressions

use std::fmt;
use std::sync::Arc;

use cel_parser::Expression;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::activation::Activation;
use crate::check;
use crate::convert::{from_val, val_to_json};
use crate::decls::{Declaration, FunctionDecl};
use crate::env::{default_env, Env};
use crate::error::Result;
use crate::runtime;
use crate::types::Type;

/// An expression checked against an environment and ready to evaluate
///
/// `Expr` is immutable. Evaluation builds fresh engine state per call, so
/// one instance may be evaluated from many threads at once.
///
/// # Examples
///
/// ```
/// use cel_expr::{Activation, Expr};
/// use serde_json::json;
///
/// let expr = Expr::new("has(this.v1) && this.v1 > 0").unwrap();
/// let input = Activation::new().bind("this", &json!({"v1": 1})).unwrap();
/// assert_eq!(expr.eval(&input).unwrap(), json!(true));
/// ```
#[derive(Clone)]
pub struct Expr {
    source: Arc<str>,
    /// Lowered tree handed to the engine
    ast: Arc<Expression>,
    output_type: Type,
    env: Env,
    /// Declared functions, resolved once at compile time
    functions: Arc<[Arc<FunctionDecl>]>,
}

impl Expr {
    /// Compile against the default environment, which declares only `this`
    pub fn new(source: &str) -> Result<Self> {
        Self::with_env(source, default_env())
    }

    /// Compile against `env`
    pub fn with_env(source: &str, env: &Env) -> Result<Self> {
        let checked = check::check(source, env)?;
        let output_type = checked.output_type;

        debug!("Compiled expression '{}' with output type {}", source, output_type);

        Ok(Self {
            source: source.into(),
            ast: Arc::new(runtime::lower(&checked.ast)),
            output_type,
            env: env.clone(),
            functions: env.functions().into(),
        })
    }

    /// Compile against a one-off environment holding `declarations`
    pub fn with_declarations<I>(source: &str, declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Declaration>,
    {
        Self::with_env(source, &Env::new(declarations)?)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Statically inferred result type; `dyn` when it depends on input
    pub fn output_type(&self) -> &Type {
        &self.output_type
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Evaluate and normalize the result into its host shape
    ///
    /// # Errors
    ///
    /// Returns the evaluation error kinds of [`ExprError`](crate::ExprError):
    /// missing attributes or keys, overload mismatches, binding faults,
    /// expired deadlines, and results with no host shape.
    pub fn eval(&self, input: &Activation) -> Result<JsonValue> {
        trace!("Evaluating '{}' with {} binding(s)", self.source, input.len());
        let value = runtime::execute(&self.ast, &self.functions, input)?;
        val_to_json(&value)
    }

    /// Evaluate and convert the result into `T`
    pub fn eval_as<T: DeserializeOwned>(&self, input: &Activation) -> Result<T> {
        trace!("Evaluating '{}' with {} binding(s)", self.source, input.len());
        let value = runtime::execute(&self.ast, &self.functions, input)?;
        from_val(&value)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expr")
            .field("source", &self.source)
            .field("output_type", &self.output_type)
            .finish()
    }
}
