//! Expression environments
//!
//! An [`Env`] is an immutable set of declarations. Extending an environment
//! produces a child that shares its parent and only stores what it adds.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::check::stdlib::RESERVED;
use crate::decls::{use_this_variable, Declaration, FunctionDecl, Overload};
use crate::error::{ExprError, Result};
use crate::program::Expr;
use crate::types::{Type, TypeDescriptor};

/// Default source size limit, in code points
const DEFAULT_EXPRESSION_SIZE_LIMIT: usize = 100_000;

/// Default delimiter nesting limit
const DEFAULT_MAX_NESTING_DEPTH: usize = 250;

static DEFAULT_ENV: Lazy<Env> = Lazy::new(|| {
    let mut layer = Layer::default();
    if let Declaration::Variable { name, ty } = use_this_variable() {
        layer.variables.insert(name, ty);
    }
    Env {
        inner: Arc::new(EnvInner {
            parent: None,
            config: EnvConfig::default(),
            layer,
        }),
    }
});

/// Process-wide environment declaring only `this` as `map(string, dyn)`
pub fn default_env() -> &'static Env {
    &DEFAULT_ENV
}

/// Compilation limits applied to every expression of an environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvConfig {
    /// Maximum source length in code points
    #[serde(default = "default_expression_size_limit")]
    pub expression_size_limit: usize,

    /// Maximum nesting of parentheses, brackets and braces
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_expression_size_limit() -> usize {
    DEFAULT_EXPRESSION_SIZE_LIMIT
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            expression_size_limit: DEFAULT_EXPRESSION_SIZE_LIMIT,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// Declarations added by one environment level
#[derive(Debug, Default)]
struct Layer {
    variables: IndexMap<String, Type>,
    /// Complete overload sets, merged with the parent's where names overlap
    functions: IndexMap<String, Arc<FunctionDecl>>,
    types: IndexMap<String, TypeDescriptor>,
}

#[derive(Debug)]
struct EnvInner {
    parent: Option<Env>,
    config: EnvConfig,
    layer: Layer,
}

/// Immutable set of variable, function and type declarations
///
/// # Examples
///
/// ```
/// use cel_expr::{variable, Env, Type};
///
/// let env = Env::new([variable("v", Type::Int)]).unwrap();
/// let child = env.extend([variable("w", Type::String)]).unwrap();
///
/// assert!(env.variable("w").is_none());
/// assert_eq!(child.variable("v"), Some(&Type::Int));
/// ```
#[derive(Debug, Clone)]
pub struct Env {
    inner: Arc<EnvInner>,
}

impl Env {
    /// Build an environment with the default configuration
    pub fn new<I>(declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Declaration>,
    {
        Self::with_config(EnvConfig::default(), declarations)
    }

    /// Build an environment with explicit compilation limits
    pub fn with_config<I>(config: EnvConfig, declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Declaration>,
    {
        Self::build(None, config, declarations)
    }

    /// Derive an environment holding this one's declarations plus `declarations`
    ///
    /// `self` is left untouched.
    pub fn extend<I>(&self, declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Declaration>,
    {
        Self::build(Some(self.clone()), self.inner.config.clone(), declarations)
    }

    /// Compile an expression against this environment
    pub fn compile(&self, source: &str) -> Result<Expr> {
        Expr::with_env(source, self)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.inner.config
    }

    /// Declared type of a variable
    pub fn variable(&self, name: &str) -> Option<&Type> {
        self.levels().find_map(|layer| layer.variables.get(name))
    }

    /// Overload set of a declared function
    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDecl>> {
        self.levels().find_map(|layer| layer.functions.get(name))
    }

    /// Registered descriptor of an object type
    pub fn type_descriptor(&self, name: &str) -> Option<&TypeDescriptor> {
        self.levels().find_map(|layer| layer.types.get(name))
    }

    /// Every declared function, nearest declaration first
    pub fn functions(&self) -> Vec<Arc<FunctionDecl>> {
        let mut seen: IndexMap<&str, Arc<FunctionDecl>> = IndexMap::new();
        for layer in self.levels() {
            for (name, decl) in &layer.functions {
                seen.entry(name.as_str()).or_insert_with(|| decl.clone());
            }
        }
        seen.into_values().collect()
    }

    fn levels(&self) -> impl Iterator<Item = &Layer> {
        std::iter::successors(Some(self), |env| env.inner.parent.as_ref()).map(|env| &env.inner.layer)
    }

    fn build<I>(parent: Option<Env>, config: EnvConfig, declarations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Declaration>,
    {
        let mut builder = Builder {
            parent: parent.as_ref(),
            layer: Layer::default(),
        };
        for decl in declarations {
            builder.add(decl)?;
        }
        builder.validate()?;

        let layer = builder.layer;
        debug!(
            "Environment built: {} variable(s), {} function(s), {} type(s), extends={}",
            layer.variables.len(),
            layer.functions.len(),
            layer.types.len(),
            parent.is_some()
        );

        Ok(Self {
            inner: Arc::new(EnvInner {
                parent,
                config,
                layer,
            }),
        })
    }
}

/// Accumulates one layer of declarations, rejecting conflicts
struct Builder<'p> {
    parent: Option<&'p Env>,
    layer: Layer,
}

impl Builder<'_> {
    fn add(&mut self, decl: Declaration) -> Result<()> {
        match decl {
            Declaration::Variable { name, ty } => self.add_variable(name, ty),
            Declaration::Function(func) => self.add_function(func),
            Declaration::Types(descriptors) => descriptors
                .into_iter()
                .try_for_each(|desc| self.add_type(desc)),
        }
    }

    fn add_variable(&mut self, name: String, ty: Type) -> Result<()> {
        let existing = self
            .layer
            .variables
            .get(&name)
            .or_else(|| self.parent.and_then(|p| p.variable(&name)));
        match existing {
            Some(prev) if *prev != ty => Err(ExprError::DeclarationConflict(format!(
                "variable '{}' redeclared as '{}', previously '{}'",
                name, ty, prev
            ))),
            Some(_) => Ok(()),
            None => {
                self.layer.variables.insert(name, ty);
                Ok(())
            }
        }
    }

    fn add_function(&mut self, func: FunctionDecl) -> Result<()> {
        if RESERVED.contains(&func.name()) {
            return Err(ExprError::DeclarationConflict(format!(
                "function '{}' is reserved",
                func.name()
            )));
        }

        let mut merged = match self.layer.functions.get(func.name()) {
            Some(decl) => decl.as_ref().clone(),
            None => match self.parent.and_then(|p| p.function(func.name())) {
                Some(decl) => decl.as_ref().clone(),
                None => FunctionDecl::new(func.name(), Vec::new()),
            },
        };

        for ov in func.overloads() {
            validate_arity(func.name(), ov)?;
            merge_overload(&mut merged, ov.clone())?;
        }

        self.layer
            .functions
            .insert(func.name().to_string(), Arc::new(merged));
        Ok(())
    }

    fn add_type(&mut self, desc: TypeDescriptor) -> Result<()> {
        let existing = self
            .layer
            .types
            .get(desc.name())
            .or_else(|| self.parent.and_then(|p| p.type_descriptor(desc.name())));
        match existing {
            Some(prev) if *prev != desc => Err(ExprError::DeclarationConflict(format!(
                "type '{}' registered twice with different fields",
                desc.name()
            ))),
            Some(_) => Ok(()),
            None => {
                self.layer.types.insert(desc.name().to_string(), desc);
                Ok(())
            }
        }
    }

    /// Every object type referenced by this layer must be registered
    fn validate(&self) -> Result<()> {
        let mut referenced = Vec::new();
        for ty in self.layer.variables.values() {
            ty.object_names(&mut referenced);
        }
        for decl in self.layer.functions.values() {
            for ov in decl.overloads() {
                ov.args().iter().for_each(|t| t.object_names(&mut referenced));
                ov.result().object_names(&mut referenced);
            }
        }
        for desc in self.layer.types.values() {
            desc.fields().for_each(|(_, t)| t.object_names(&mut referenced));
        }

        for name in referenced {
            let known = self.layer.types.contains_key(&name)
                || self.parent.and_then(|p| p.type_descriptor(&name)).is_some();
            if !known {
                return Err(ExprError::InvalidDeclaration(format!(
                    "type '{}' is not registered",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn validate_arity(function: &str, ov: &Overload) -> Result<()> {
    match ov.binding().arity() {
        Some(arity) if arity != ov.args().len() => Err(ExprError::InvalidDeclaration(format!(
            "overload '{}' of '{}' declares {} argument(s) but its binding takes {}",
            ov.id(),
            function,
            ov.args().len(),
            arity
        ))),
        _ => Ok(()),
    }
}

fn merge_overload(decl: &mut FunctionDecl, ov: Overload) -> Result<()> {
    let name = decl.name().to_string();
    let overloads = decl.overloads_mut();

    if let Some(pos) = overloads.iter().position(|o| o.id() == ov.id()) {
        if !overloads[pos].same_signature(&ov) {
            return Err(ExprError::DeclarationConflict(format!(
                "overload '{}' of '{}' redeclared with a different signature",
                ov.id(),
                name
            )));
        }
        overloads[pos] = ov;
        return Ok(());
    }

    if let Some(prev) = overloads.iter().find(|o| o.overlaps(&ov)) {
        return Err(ExprError::DeclarationConflict(format!(
            "overload '{}' of '{}' overlaps with existing overload '{}'",
            ov.id(),
            name,
            prev.id()
        )));
    }

    overloads.push(ov);
    Ok(())
}
