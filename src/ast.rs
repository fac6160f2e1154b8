//! Abstract syntax tree for embedded expressions.
//!
//! One `${...}` span parses into one [`Expr`]. The AST is the contract
//! between the parser and the evaluator; nothing downstream ever re-reads
//! the expression text.

/// Expression — the universal value-producing node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal: `0.3`, `42`
    Number(f64),
    /// String literal: `"dark"`, `'8px'`
    Str(String),
    /// Boolean literal: `true`, `false`
    Bool(bool),
    /// Null literal.
    Null,
    /// Identifier: `count`, `theme`
    Ident(String),
    /// Dotted field access into a map value: `user.prefs.width`
    Field { object: Box<Expr>, field: String },
    /// Function call: `px(4)`, `darken(accent, 10)`
    Call { callee: String, args: Vec<Expr> },
    /// Unary operation: `-x`, `!loggedIn`
    Unary { op: UnOp, operand: Box<Expr> },
    /// Binary operation: `count * 8`, `name + "px"`
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Ternary: `loggedIn ? 'flex' : 'none'`
    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Array literal: `[4, 8, 16]`
    Array(Vec<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -
    Not, // !
}

/// Binary operators with standard precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,  // ||
    And, // &&
    Eq,  // ==
    Ne,  // !=
    Lt,  // <
    Gt,  // >
    Le,  // <=
    Ge,  // >=
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Rem, // %
}

impl BinOp {
    /// Precedence level (higher binds tighter).
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}
