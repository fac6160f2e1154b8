use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while lexing, parsing, or evaluating an embedded
/// expression.
///
/// At compile time every `EvalError` reclassifies the affected span as
/// deferred; at runtime it routes the placeholder through the fail-open
/// substitution policy. Neither path aborts a compile or a recomposition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Lexer encountered an unrecognized character/sequence.
    #[error("unrecognized token: {0}")]
    UnrecognizedToken(String),

    /// Parser expected one thing, got another.
    #[error("expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },

    /// Parser reached the end of the expression unexpectedly.
    #[error("unexpected end of expression, expected {0}")]
    UnexpectedEof(String),

    /// Identifier not bound in the evaluation scope.
    #[error("unknown name: {0}")]
    UnknownName(String),

    /// Call target is not a registered function.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Call target exists in scope but is not callable.
    #[error("'{0}' is not callable")]
    NotCallable(String),

    /// Wrong number of arguments to a registry function.
    #[error("{name}() expects {expected}, got {got} argument(s)")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// Operand or argument had the wrong type.
    #[error("type error: {0}")]
    Type(String),

    /// A registry function re-entered itself.
    #[error("recursive call to '{0}'")]
    Recursive(String),

    /// The per-expression evaluation budget ran out.
    #[error("expression evaluation budget exhausted")]
    BudgetExhausted,
}

impl EvalError {
    /// Shorthand for [`EvalError::UnexpectedToken`].
    pub fn unexpected_token(expected: &str, got: &str) -> Self {
        Self::UnexpectedToken {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Shorthand for [`EvalError::Type`].
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Shorthand for [`EvalError::Arity`].
    pub fn arity(name: &str, expected: &str, got: usize) -> Self {
        Self::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got,
        }
    }
}

/// Errors produced by the compiler entry points, the runtime engine, and the
/// dev server. Expression failures never surface here.
#[derive(Debug, Error)]
pub enum CssxError {
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid state file '{}': {source}", path.display())]
    BadState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CssxError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CssxError>;
