//! Expression evaluation against a state + function scope.
//!
//! The [`ExpressionEvaluator`] trait is the single seam between the engine
//! and the expression language: both the compile-time static evaluator and
//! the runtime compositor go through it, so a different embedded language
//! can be substituted without touching either caller.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinOp, Expr, UnOp};
use crate::error::EvalError;
use crate::functions::FunctionRegistry;
use crate::parser::parse_expression;
use crate::value::Value;

/// The name bindings an expression evaluates against: the current state
/// plus the function registry. On a name collision the registry wins,
/// matching the original's scope construction.
pub struct Scope<'a> {
    pub state: &'a HashMap<String, Value>,
    pub functions: &'a FunctionRegistry,
}

/// Context handed to registry functions during a call. Exposes the state
/// (for state-aware helpers like `theme`) and re-entrant invocation of
/// function values (for `once`/`memo`).
pub struct CallContext<'a> {
    pub state: &'a HashMap<String, Value>,
    pub functions: &'a FunctionRegistry,
}

impl CallContext<'_> {
    /// Invoke a function value with the given arguments.
    pub fn invoke(&self, target: &Value, args: &[Value]) -> Result<Value, EvalError> {
        match target {
            Value::Function(name) => self.functions.call(name, self, args),
            other => Err(EvalError::NotCallable(other.type_name().to_string())),
        }
    }

    /// Look up a state key.
    pub fn state_get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }
}

/// One-method capability: evaluate an expression string against a scope.
pub trait ExpressionEvaluator: Send {
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value, EvalError>;
}

/// Default evaluator: parses the expression language and walks the tree.
///
/// Evaluation carries a fixed operation budget so a pathological expression
/// cannot stall a compile or a recomposition.
pub struct ScriptEvaluator {
    budget: u32,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self { budget: 4096 }
    }

    pub fn with_budget(budget: u32) -> Self {
        Self { budget }
    }
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for ScriptEvaluator {
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value, EvalError> {
        let ast = parse_expression(expr)?;
        let mut budget = self.budget;
        eval_expr(&ast, scope, &mut budget)
    }
}

fn eval_expr(expr: &Expr, scope: &Scope<'_>, budget: &mut u32) -> Result<Value, EvalError> {
    if *budget == 0 {
        return Err(EvalError::BudgetExhausted);
    }
    *budget -= 1;

    match expr {
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),

        Expr::Ident(name) => {
            if scope.functions.contains(name) {
                Ok(Value::Function(name.clone()))
            } else if let Some(v) = scope.state.get(name) {
                Ok(v.clone())
            } else {
                Err(EvalError::UnknownName(name.clone()))
            }
        }

        Expr::Field { object, field } => {
            let obj = eval_expr(object, scope, budget)?;
            match obj {
                Value::Map(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
                other => Err(EvalError::type_error(format!(
                    "cannot access field '{field}' on {}",
                    other.type_name()
                ))),
            }
        }

        Expr::Call { callee, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expr(arg, scope, budget)?);
            }
            let ctx = CallContext {
                state: scope.state,
                functions: scope.functions,
            };
            scope.functions.call(callee, &ctx, &evaluated)
        }

        Expr::Unary { op, operand } => {
            let v = eval_expr(operand, scope, budget)?;
            match op {
                UnOp::Neg => Ok(Value::Num(-v.as_num()?)),
                UnOp::Not => Ok(Value::Bool(!v.truthy())),
            }
        }

        Expr::Binary { left, op, right } => match op {
            // Short-circuit: `&&` and `||` yield an operand, not a boolean.
            BinOp::And => {
                let l = eval_expr(left, scope, budget)?;
                if l.truthy() {
                    eval_expr(right, scope, budget)
                } else {
                    Ok(l)
                }
            }
            BinOp::Or => {
                let l = eval_expr(left, scope, budget)?;
                if l.truthy() {
                    Ok(l)
                } else {
                    eval_expr(right, scope, budget)
                }
            }
            _ => {
                let l = eval_expr(left, scope, budget)?;
                let r = eval_expr(right, scope, budget)?;
                eval_binary(*op, l, r)
            }
        },

        Expr::Ternary {
            condition,
            if_true,
            if_false,
        } => {
            if eval_expr(condition, scope, budget)?.truthy() {
                eval_expr(if_true, scope, budget)
            } else {
                eval_expr(if_false, scope, budget)
            }
        }

        Expr::Array(elements) => {
            let mut items = Vec::with_capacity(elements.len());
            for e in elements {
                items.push(eval_expr(e, scope, budget)?);
            }
            Ok(Value::List(items))
        }
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        // `+` concatenates when either operand is a string.
        BinOp::Add => {
            if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                Ok(Value::Str(format!("{}{}", l.to_text(), r.to_text())))
            } else {
                Ok(Value::Num(l.as_num()? + r.as_num()?))
            }
        }
        BinOp::Sub => Ok(Value::Num(l.as_num()? - r.as_num()?)),
        BinOp::Mul => Ok(Value::Num(l.as_num()? * r.as_num()?)),
        BinOp::Div => Ok(Value::Num(l.as_num()? / r.as_num()?)),
        BinOp::Rem => Ok(Value::Num(l.as_num()? % r.as_num()?)),

        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::Ne => Ok(Value::Bool(l != r)),

        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = compare(&l, &r)?;
            let holds = match (op, ordering) {
                (BinOp::Lt, Some(Ordering::Less)) => true,
                (BinOp::Gt, Some(Ordering::Greater)) => true,
                (BinOp::Le, Some(Ordering::Less | Ordering::Equal)) => true,
                (BinOp::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
                _ => false,
            };
            Ok(Value::Bool(holds))
        }

        BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled in eval_expr"),
    }
}

fn compare(l: &Value, r: &Value) -> Result<Option<Ordering>, EvalError> {
    match (l, r) {
        (Value::Num(a), Value::Num(b)) => Ok(a.partial_cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        _ => Err(EvalError::type_error(format!(
            "cannot compare {} with {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}
