use crate::error::{LexError, ParseError, SyntaxError};

use super::lexer::{Token, TokenKind, Tokenizer};
use super::{List, SExpr};

/// Deepest list nesting accepted. KiCad files stay well under 32 levels.
pub const MAX_DEPTH: usize = 512;

pub(super) struct Parser<'a> {
    input: &'a str,
    iter: Tokenizer<'a>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            iter: Tokenizer::new(input),
        }
    }

    fn get(&mut self) -> Result<Option<Token>, SyntaxError> {
        match self.iter.next() {
            Some(Ok(tok)) => Ok(Some(tok)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub(super) fn parse_root(&mut self) -> Result<SExpr, SyntaxError> {
        let root = match self.get()? {
            None => return Err(ParseError::new(self.input.len(), "'(' to open the root list").into()),
            Some(tok) => match tok.kind {
                TokenKind::Open => self.parse_list(tok.span.start, 1)?,
                TokenKind::Close => {
                    return Err(LexError::UnmatchedClose {
                        offset: tok.span.start,
                    }
                    .into())
                }
                _ => return Err(ParseError::new(tok.span.start, "'(' to open the root list").into()),
            },
        };

        match self.get()? {
            None => Ok(root),
            Some(tok) if tok.kind == TokenKind::Close => Err(LexError::UnmatchedClose {
                offset: tok.span.start,
            }
            .into()),
            Some(tok) => Err(ParseError::new(tok.span.start, "end of input after the root list").into()),
        }
    }

    fn parse_list(&mut self, offset: usize, depth: usize) -> Result<SExpr, SyntaxError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::new(offset, format!("nesting depth <= {MAX_DEPTH}")).into());
        }
        let mut items = Vec::new();
        loop {
            let Some(tok) = self.get()? else {
                return Err(ParseError::new(
                    self.input.len(),
                    format!("')' to close the list opened at byte {offset}"),
                )
                .into());
            };
            match tok.kind {
                TokenKind::Close => break,
                TokenKind::Open => items.push(self.parse_list(tok.span.start, depth + 1)?),
                _ => items.push(self.scalar(&tok)?),
            }
        }
        Ok(SExpr::List(List { items, offset }))
    }

    fn scalar(&self, tok: &Token) -> Result<SExpr, SyntaxError> {
        Ok(match tok.kind {
            TokenKind::Atom => SExpr::Atom(tok.text(self.input).to_string()),
            TokenKind::String => SExpr::String(tok.unescaped(self.input).into_owned()),
            TokenKind::Number => {
                let value = tok
                    .text(self.input)
                    .parse::<f64>()
                    .map_err(|_| ParseError::new(tok.span.start, "a number"))?;
                SExpr::Number(value)
            }
            TokenKind::Open | TokenKind::Close => {
                return Err(ParseError::new(tok.span.start, "a value").into())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{LexError, ParseError, SyntaxError};
    use super::MAX_DEPTH;
    use crate::sexpr::{parse, SExpr};
    use rstest::*;

    #[rstest]
    #[case("(abc)", "(abc)")]
    #[case("(abc\n)", "(abc)")]
    #[case("( a  \"b c\"\t1 )", "(a \"b c\" 1)")]
    fn can_parse_sexpr(#[case] input: &str, #[case] expected: &str) {
        let sexpr = parse(input).unwrap();
        assert_eq!(&format!("{sexpr}"), expected);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            parse("  \n"),
            Err(SyntaxError::Parse(ParseError::new(3, "'(' to open the root list")))
        );
    }

    #[test]
    fn test_root_must_be_list() {
        assert!(matches!(
            parse("atom"),
            Err(SyntaxError::Parse(ParseError { position: 0, .. }))
        ));
    }

    #[test]
    fn test_unclosed_list() {
        let err = parse("(a (b c)").unwrap_err();
        assert!(matches!(err, SyntaxError::Parse(ParseError { position: 8, .. })));
    }

    #[test]
    fn test_stray_close() {
        assert_eq!(
            parse("(a b))"),
            Err(SyntaxError::Lex(LexError::UnmatchedClose { offset: 5 }))
        );
        assert_eq!(
            parse(")"),
            Err(SyntaxError::Lex(LexError::UnmatchedClose { offset: 0 }))
        );
    }

    #[test]
    fn test_trailing_root() {
        let err = parse("(a) (b)").unwrap_err();
        assert!(matches!(err, SyntaxError::Parse(ParseError { position: 4, .. })));
    }

    #[test]
    fn test_unterminated_string_is_lex_error() {
        assert_eq!(
            parse("(a \"b)"),
            Err(SyntaxError::Lex(LexError::UnterminatedString { offset: 3 }))
        );
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let deep = "(".repeat(100_000) + &")".repeat(100_000);
        let err = parse(&deep).unwrap_err();
        assert_eq!(
            err,
            SyntaxError::Parse(ParseError::new(MAX_DEPTH, format!("nesting depth <= {MAX_DEPTH}")))
        );

        let ok = "(".repeat(MAX_DEPTH) + &")".repeat(MAX_DEPTH);
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_scalars() {
        let sexpr = parse("(x sym \"str\" 2.5)").unwrap();
        assert_eq!(
            sexpr.children(),
            &[
                SExpr::Atom("sym".into()),
                SExpr::String("str".into()),
                SExpr::Number(2.5)
            ]
        );
    }
}
