//! Error types for expression environments, compilation and evaluation

use thiserror::Error;

use crate::check::Diagnostics;

/// Expression facade errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// A name was declared twice with incompatible signatures
    #[error("declaration conflict: {0}")]
    DeclarationConflict(String),

    /// A declaration is malformed on its own
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Source text could not be tokenized or parsed
    #[error("{0}")]
    Parse(Diagnostics),

    /// Source text parsed but does not check against the environment
    #[error("{0}")]
    TypeCheck(Diagnostics),

    /// A top-level variable is absent from the activation
    #[error("no such attribute(s): {0}")]
    NoSuchAttribute(String),

    /// A key is absent from a present map
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// No overload accepts the runtime argument types
    #[error("found no matching overload for '{function}' applied to '({args})'")]
    NoMatchingOverload { function: String, args: String },

    /// A native binding faulted
    #[error("internal error: {0}")]
    Internal(String),

    /// A native binding returned an explicit error value
    #[error("{message}")]
    Function { function: String, message: String },

    /// The result could not be converted to the requested shape
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The activation deadline expired
    #[error("operation interrupted")]
    Interrupted,

    /// Any other failure reported by the engine
    #[error("{0}")]
    Evaluation(String),
}

impl ExprError {
    /// Diagnostics attached to a compilation failure, if any
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Parse(diags) | Self::TypeCheck(diags) => Some(diags),
            _ => None,
        }
    }

    /// Whether this error was raised before evaluation started
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::DeclarationConflict(_)
                | Self::InvalidDeclaration(_)
                | Self::Parse(_)
                | Self::TypeCheck(_)
        )
    }
}

impl From<serde_json::Error> for ExprError {
    fn from(err: serde_json::Error) -> Self {
        Self::Conversion(err.to_string())
    }
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_messages() {
        assert_eq!(
            ExprError::NoSuchAttribute("this".into()).to_string(),
            "no such attribute(s): this"
        );
        assert_eq!(ExprError::NoSuchKey("v1".into()).to_string(), "no such key: v1");
        assert_eq!(
            ExprError::Internal("this is panic".into()).to_string(),
            "internal error: this is panic"
        );
        assert_eq!(
            ExprError::Function {
                function: "distance".into(),
                message: "this is error".into(),
            }
            .to_string(),
            "this is error"
        );
    }

    #[test]
    fn test_overload_message() {
        let err = ExprError::NoMatchingOverload {
            function: "_<_".into(),
            args: "double, int".into(),
        };
        assert_eq!(
            err.to_string(),
            "found no matching overload for '_<_' applied to '(double, int)'"
        );
        assert!(!err.is_compile_error());
    }
}
