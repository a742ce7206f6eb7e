//! Compile-time checking
//!
//! Source text goes through three stages, each of which stops compilation
//! on failure:
//!
//! 1. size and lexical checks (token recognition, delimiter nesting)
//! 2. the engine parser
//! 3. declaration and overload checking against an [`Env`]
//!
//! Failures carry [`Diagnostics`] rendered in the cel-go caret format.

mod checker;
mod diagnostic;
mod lexer;
pub(crate) mod stdlib;

pub use diagnostic::{Diagnostic, Diagnostics, Location};

use std::panic::{self, AssertUnwindSafe};

use cel_parser::Expression;
use tracing::debug;

use crate::env::Env;
use crate::error::{ExprError, Result};
use crate::types::Type;
use checker::Checker;

/// A parsed tree that passed checking, with its inferred result type
#[derive(Debug)]
pub(crate) struct Checked {
    pub ast: Expression,
    pub output_type: Type,
}

/// Check `source` against `env`
pub(crate) fn check(source: &str, env: &Env) -> Result<Checked> {
    let limit = env.config().expression_size_limit;
    let size = source.chars().count();
    if size > limit {
        return Err(parse_error(
            source,
            [(
                Location::START,
                format!(
                    "expression code point size exceeds limit: size: {}, limit {}",
                    size, limit
                ),
            )],
        ));
    }

    let lexed = lexer::tokenize(source);
    if !lexed.errors.is_empty() {
        return Err(parse_error(source, lexed.errors));
    }

    let delimiter_errors = lexer::check_delimiters(&lexed, env.config().max_nesting_depth);
    if !delimiter_errors.is_empty() {
        return Err(parse_error(source, delimiter_errors));
    }

    // The parser unwraps literal conversions, so overflowing or malformed
    // literals unwind out of it
    let ast = match panic::catch_unwind(AssertUnwindSafe(|| cel_parser::parse(source))) {
        Ok(Ok(ast)) => ast,
        Ok(Err(e)) => {
            return Err(parse_error(
                source,
                [(Location::START, format!("Syntax error: {}", e))],
            ))
        }
        Err(_) => {
            return Err(parse_error(
                source,
                [(Location::START, "Syntax error: invalid literal".to_string())],
            ))
        }
    };

    let (output_type, diagnostics) = Checker::new(env, source, &lexed.tokens).run(&ast);
    if !diagnostics.is_empty() {
        debug!("Expression rejected with {} diagnostic(s)", diagnostics.len());
        return Err(ExprError::TypeCheck(diagnostics));
    }
    Ok(Checked { ast, output_type })
}

fn parse_error<I>(source: &str, errors: I) -> ExprError
where
    I: IntoIterator<Item = (Location, String)>,
{
    let mut diagnostics = Diagnostics::default();
    for (location, message) in errors {
        diagnostics.push(Diagnostic::new(source, location, message));
    }
    ExprError::Parse(diagnostics.sorted())
}
