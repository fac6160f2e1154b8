use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Dynamically typed value flowing through expression evaluation.
///
/// `Null`/`Bool`/`Num`/`Str`/`List`/`Map` round-trip through JSON (state
/// files, the `POST /state` endpoint). `Function` is a reference to a
/// registry entry by name — it exists so `once`/`memo` can receive a
/// function as an argument — and never serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    #[serde(skip)]
    Function(String),
}

impl Value {
    /// True for the three types a compiled or recomposed span may render:
    /// string, number, boolean. Everything else defers.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Num(_) | Value::Bool(_))
    }

    /// Render a primitive value as CSS text.
    ///
    /// Strings lose one layer of surrounding matching quotes (supports
    /// expressions that return quoted literals); numbers with no fractional
    /// part print without a decimal point. Non-primitives return `None`.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(strip_quotes(s).to_string()),
            Value::Num(n) => Some(fmt_number(*n)),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Display text used by string concatenation and unit helpers. Unlike
    /// [`Value::render`] this never strips quotes and covers every variant.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => fmt_number(*n),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object]".to_string(),
            Value::Function(name) => format!("[function {name}]"),
        }
    }

    /// Truthiness, matching the original host language's coercion rules.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Function(_) => true,
        }
    }

    /// Variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    /// Numeric coercion for arithmetic and stdlib helpers.
    pub fn as_num(&self) -> Result<f64, EvalError> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(EvalError::type_error(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    /// String coercion for stdlib helpers that take a literal.
    pub fn as_str(&self) -> Result<&str, EvalError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::type_error(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Num(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Num(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Strip one layer of surrounding matching quote characters.
pub fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Format a number the way the original stringified it: integral values
/// print with no decimal point.
pub fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
