use std::borrow::Cow;
use std::ops::Range;

use logos::Logos;

use crate::error::LexError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    Atom,
    /// Quoted string; the span covers the quotes.
    String,
    Number,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    /// Raw source text of the token.
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.clone()]
    }

    /// Contents of a string token with escapes resolved.
    pub fn unescaped<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let raw = self.text(input);
        match self.kind {
            TokenKind::String => unescape(&raw[1..raw.len() - 1]),
            _ => Cow::Borrowed(raw),
        }
    }
}

/// Lazy token stream over KiCad text. Cloning yields an independent cursor at
/// the same position; [`Tokenizer::new`] restarts from the beginning.
#[derive(Clone)]
pub struct Tokenizer<'a> {
    lexer: logos::Lexer<'a, RawToken>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: RawToken::lexer(input),
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.lexer.next()?;
        let span = self.lexer.span();
        let kind = match raw {
            Ok(RawToken::Open) => TokenKind::Open,
            Ok(RawToken::Close) => TokenKind::Close,
            Ok(RawToken::Quoted) => TokenKind::String,
            Ok(RawToken::Number) => TokenKind::Number,
            Ok(RawToken::Atom) => TokenKind::Atom,
            Err(()) => {
                let offset = span.start;
                let err = if self.lexer.source()[offset..].starts_with('"') {
                    LexError::UnterminatedString { offset }
                } else {
                    LexError::Unrecognized { offset }
                };
                return Some(Err(err));
            }
        };
        Some(Ok(Token { kind, span }))
    }
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[regex(r#""([^"\\]|\\.)*""#)]
    Quoted,
    #[regex(r"[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?", priority = 5)]
    Number,
    #[regex(r#"[^ \t\r\n\f()"]+"#, priority = 1)]
    Atom,
}

/// Resolve C-style escapes inside a quoted string body.
pub(crate) fn unescape(body: &str) -> Cow<'_, str> {
    if !body.contains('\\') {
        return Cow::Borrowed(body);
    }
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        Tokenizer::new(input)
            .map(|t| {
                let t = t.unwrap();
                (t.kind, t.text(input))
            })
            .collect()
    }

    #[test]
    fn test_tokens() {
        let input = "(a \"b\" \"\" 1.5 -2 x1 \n)";
        let expected = vec![
            (TokenKind::Open, "("),
            (TokenKind::Atom, "a"),
            (TokenKind::String, "\"b\""),
            (TokenKind::String, "\"\""),
            (TokenKind::Number, "1.5"),
            (TokenKind::Number, "-2"),
            (TokenKind::Atom, "x1"),
            (TokenKind::Close, ")"),
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn test_number_grammar() {
        for n in ["0", "+1", "-0.5", ".25", "3.", "1e5", "2.5E-3"] {
            assert_eq!(kinds(n), vec![(TokenKind::Number, n)], "{n}");
        }
        for a in ["1abc", "-", "+", "1.2.3", "e5", "F.Cu", "~"] {
            assert_eq!(kinds(a), vec![(TokenKind::Atom, a)], "{a}");
        }
    }

    #[test]
    fn test_escapes() {
        let input = r#""say \"hi\" \\ now""#;
        let tok = Tokenizer::new(input).next().unwrap().unwrap();
        assert_eq!(tok.unescaped(input), "say \"hi\" \\ now");
    }

    #[test]
    fn test_unterminated_string() {
        let input = "(a \"never closed)";
        let err = Tokenizer::new(input)
            .find_map(|t| t.err())
            .expect("lex error");
        assert_eq!(err, LexError::UnterminatedString { offset: 3 });
    }

    #[test]
    fn test_restartable() {
        let input = "(a b)";
        let mut first = Tokenizer::new(input);
        first.next();
        let fork = first.clone();
        assert_eq!(first.count(), fork.count());
        assert_eq!(Tokenizer::new(input).count(), 4);
    }
}
