use logos::Logos;

use crate::error::EvalError;
use crate::token::{Spanned, Token};

/// Tokenize an embedded expression into a vector of spanned tokens.
pub fn lex(source: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => {
                tokens.push(Spanned { token, span });
            }
            Err(()) => {
                let fragment = &source[span];
                return Err(EvalError::UnrecognizedToken(fragment.to_string()));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_call_with_args() {
        let tokens = lex(r##"darken("#e84393", 10)"##).expect("lexing should succeed");
        let kinds: Vec<_> = tokens.iter().map(|t| &t.token).collect();

        assert!(matches!(kinds[0], Token::Ident(s) if s == "darken"));
        assert_eq!(kinds[1], &Token::LParen);
        assert!(matches!(kinds[2], Token::Str(s) if s == "#e84393"));
        assert_eq!(kinds[3], &Token::Comma);
        assert!(matches!(kinds[4], Token::Number(v) if (*v - 10.0).abs() < 1e-10));
        assert_eq!(kinds[5], &Token::RParen);
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn lex_single_quoted_string() {
        let tokens = lex("'dark'").unwrap();
        assert!(matches!(&tokens[0].token, Token::Str(s) if s == "dark"));
    }

    #[test]
    fn lex_ternary_and_comparison() {
        let tokens = lex("count >= 3 ? 'big' : 'small'").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.token).collect();
        assert!(matches!(kinds[0], Token::Ident(s) if s == "count"));
        assert_eq!(kinds[1], &Token::GreaterEq);
        assert!(matches!(kinds[2], Token::Number(v) if (*v - 3.0).abs() < 1e-10));
        assert_eq!(kinds[3], &Token::Question);
        assert_eq!(kinds[5], &Token::Colon);
    }

    #[test]
    fn lex_keywords_not_idents() {
        let tokens = lex("true && !false || null").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.token).collect();
        assert_eq!(kinds[0], &Token::Bool(true));
        assert_eq!(kinds[1], &Token::AndAnd);
        assert_eq!(kinds[2], &Token::Bang);
        assert_eq!(kinds[3], &Token::Bool(false));
        assert_eq!(kinds[4], &Token::OrOr);
        assert_eq!(kinds[5], &Token::Null);
    }

    #[test]
    fn lex_dotted_access() {
        let tokens = lex("user.prefs.width").unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[1].token, Token::Dot);
        assert_eq!(tokens[3].token, Token::Dot);
    }

    #[test]
    fn lex_rejects_garbage() {
        let err = lex("width @ 3").unwrap_err();
        assert!(matches!(err, EvalError::UnrecognizedToken(s) if s == "@"));
    }
}
