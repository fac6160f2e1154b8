use crate::ast::{BinOp, Expr, UnOp};
use crate::error::EvalError;
use crate::lexer;
use crate::token::{Spanned, Token};

/// Parse one embedded expression into an AST.
///
/// Trailing input after a complete expression is an error — the whole span
/// between `${` and `}` must be a single expression.
pub fn parse_expression(source: &str) -> Result<Expr, EvalError> {
    let tokens = lexer::lex(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr(0)?;
    if let Some(extra) = parser.peek() {
        return Err(EvalError::unexpected_token(
            "end of expression",
            extra.describe(),
        ));
    }
    Ok(expr)
}

/// Recursive descent parser for embedded expressions.
///
/// Grammar is LL(1) with Pratt-style precedence climbing.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(EvalError::unexpected_token(
                expected.describe(),
                t.describe(),
            )),
            None => Err(EvalError::UnexpectedEof(expected.describe().to_string())),
        }
    }

    fn expect_ident(&mut self) -> Result<String, EvalError> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let s = self.advance().unwrap();
                if let Token::Ident(name) = &s.token {
                    Ok(name.clone())
                } else {
                    unreachable!()
                }
            }
            Some(t) => Err(EvalError::unexpected_token("identifier", t.describe())),
            None => Err(EvalError::UnexpectedEof("identifier".to_string())),
        }
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    // ── Expressions (Pratt precedence climbing) ────────────────────────

    pub fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::OrOr) => BinOp::Or,
                Some(Token::AndAnd) => BinOp::And,
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                Some(Token::Less) => BinOp::Lt,
                Some(Token::Greater) => BinOp::Gt,
                Some(Token::LessEq) => BinOp::Le,
                Some(Token::GreaterEq) => BinOp::Ge,
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };

            if op.precedence() <= min_prec {
                break;
            }

            self.advance(); // consume operator
            let right = self.parse_expr(op.precedence())?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        // Ternary: expr ? expr : expr (lowest precedence — only at top level)
        if min_prec == 0 && self.at(&Token::Question) {
            self.advance();
            let if_true = self.parse_expr(0)?;
            self.expect(&Token::Colon)?;
            let if_false = self.parse_expr(0)?;
            left = Expr::Ternary {
                condition: Box::new(left),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.at(&Token::Minus) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(expr),
            });
        }
        if self.at(&Token::Bang) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let expr = match self.peek() {
            Some(Token::Number(_)) => {
                let s = self.advance().unwrap();
                if let Token::Number(v) = s.token {
                    Expr::Number(v)
                } else {
                    unreachable!()
                }
            }
            Some(Token::Str(_)) => {
                let s = self.advance().unwrap();
                if let Token::Str(v) = &s.token {
                    Expr::Str(v.clone())
                } else {
                    unreachable!()
                }
            }
            Some(Token::Bool(_)) => {
                let s = self.advance().unwrap();
                if let Token::Bool(v) = s.token {
                    Expr::Bool(v)
                } else {
                    unreachable!()
                }
            }
            Some(Token::Null) => {
                self.advance();
                Expr::Null
            }
            Some(Token::Ident(_)) => {
                let name = self.expect_ident()?;

                // Function call: ident(...)
                if self.at(&Token::LParen) {
                    let args = self.parse_args()?;
                    Expr::Call { callee: name, args }
                }
                // Field access: ident.ident.ident
                else if self.at(&Token::Dot) {
                    let mut expr = Expr::Ident(name);
                    while self.at(&Token::Dot) {
                        self.advance();
                        let field = self.expect_ident()?;
                        expr = Expr::Field {
                            object: Box::new(expr),
                            field,
                        };
                    }
                    expr
                } else {
                    Expr::Ident(name)
                }
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                expr
            }
            Some(Token::LBracket) => {
                self.advance();
                let mut elements = Vec::new();
                if !self.at(&Token::RBracket) {
                    loop {
                        elements.push(self.parse_expr(0)?);
                        if self.at(&Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Expr::Array(elements)
            }
            Some(t) => {
                return Err(EvalError::unexpected_token("expression", t.describe()));
            }
            None => {
                return Err(EvalError::UnexpectedEof("expression".to_string()));
            }
        };

        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if self.at(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_operator_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parse_call_with_nested_call() {
        let expr = parse_expression("px(clamp(0, width, 100))").unwrap();
        match expr {
            Expr::Call { callee, args } => {
                assert_eq!(callee, "px");
                assert_eq!(args.len(), 1);
                assert!(matches!(&args[0], Expr::Call { callee, .. } if callee == "clamp"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parse_ternary() {
        let expr = parse_expression("loggedIn ? 'flex' : 'none'").unwrap();
        assert!(matches!(expr, Expr::Ternary { .. }));
    }

    #[test]
    fn parse_field_access_chain() {
        let expr = parse_expression("user.prefs.width").unwrap();
        match expr {
            Expr::Field { object, field } => {
                assert_eq!(field, "width");
                assert!(matches!(*object, Expr::Field { .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parse_array_literal() {
        let expr = parse_expression("[1, 2, 3]").unwrap();
        assert!(matches!(expr, Expr::Array(elements) if elements.len() == 3));
    }

    #[test]
    fn parse_rejects_trailing_input() {
        let err = parse_expression("1 2").unwrap_err();
        assert!(matches!(err, EvalError::UnexpectedToken { .. }));
    }

    #[test]
    fn parse_string_concat() {
        let expr = parse_expression("count + 'px'").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn parse_double_unary() {
        let expr = parse_expression("!!loggedIn").unwrap();
        match expr {
            Expr::Unary { op: UnOp::Not, operand } => {
                assert!(matches!(*operand, Expr::Unary { op: UnOp::Not, .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
