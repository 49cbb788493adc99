//! Generic S-expression layer for KiCad files.
//!
//! Grammar:
//!   sexpr  = '(' item* ')'
//!   item   = sexpr | string | number | atom
//!   string = '"' ( [^"\\] | '\' any )* '"'
//!   number = [+-]? ( digits [ '.' digits? ] | '.' digits ) [ [eE] [+-]? digits ]
//!   atom   = [^ \t\r\n\f()"]+
//!
//! The tree carries no KiCad knowledge; binding to typed entities happens in
//! [`crate::parsers`].

use std::borrow::Cow;
use std::fmt::{self, Display, Write};

use serde::Serialize;

use crate::error::SyntaxError;

mod lexer;
mod parser;

pub use lexer::{Token, TokenKind, Tokenizer};
pub use parser::MAX_DEPTH;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SExpr {
    Atom(String),
    Number(f64),
    String(String),
    List(List),
}

/// A parenthesized list. `offset` is the byte position of its `(` and does
/// not take part in equality.
#[derive(Debug, Clone, Default, Serialize)]
pub struct List {
    pub items: Vec<SExpr>,
    #[serde(skip)]
    pub offset: usize,
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl List {
    pub fn new(items: Vec<SExpr>) -> Self {
        Self { items, offset: 0 }
    }
}

/// Parse exactly one root list from `input`.
pub fn parse(input: &str) -> Result<SExpr, SyntaxError> {
    parser::Parser::new(input).parse_root()
}

impl SExpr {
    pub fn list(items: Vec<SExpr>) -> Self {
        SExpr::List(List::new(items))
    }

    /// Get the first atom in a list (the "tag" or "head").
    pub fn tag(&self) -> Option<&str> {
        match self {
            SExpr::List(list) => list.items.first().and_then(|item| match item {
                SExpr::Atom(s) => Some(s.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Get list children (everything after the tag).
    pub fn children(&self) -> &[SExpr] {
        match self {
            SExpr::List(list) if !list.items.is_empty() => &list.items[1..],
            _ => &[],
        }
    }

    /// Get all items including tag.
    pub fn items(&self) -> &[SExpr] {
        match self {
            SExpr::List(list) => &list.items,
            _ => &[],
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SExpr::List(_))
    }

    /// Byte offset of the opening paren, for lists.
    pub fn offset(&self) -> Option<usize> {
        match self {
            SExpr::List(list) => Some(list.offset),
            _ => None,
        }
    }

    /// Find a child list with the given tag.
    pub fn find(&self, tag: &str) -> Option<&SExpr> {
        self.children().iter().find(|c| c.tag() == Some(tag))
    }

    /// Find all child lists with the given tag.
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a SExpr> + 'a {
        self.children().iter().filter(move |c| c.tag() == Some(tag))
    }

    /// Get the text of a simple `(tag value)` node.
    pub fn value(&self, tag: &str) -> Option<Cow<'_, str>> {
        self.find(tag)
            .and_then(|node| node.children().first())
            .and_then(|v| v.text())
    }

    /// The atom or string payload, borrowed.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SExpr::Atom(s) | SExpr::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Textual value of a scalar. Numbers are rendered back to text, so an
    /// unquoted pad name like `1` still reads as `"1"`.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            SExpr::Atom(s) | SExpr::String(s) => Some(Cow::Borrowed(s.as_str())),
            SExpr::Number(n) => Some(Cow::Owned(format_number(*n))),
            SExpr::List(_) => None,
        }
    }

    /// Numeric value. Only number tokens qualify; `"1"` stays a string.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SExpr::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the nth child as text (0-indexed from children, i.e. after the tag).
    pub fn text_at(&self, index: usize) -> Option<Cow<'_, str>> {
        self.children().get(index).and_then(|v| v.text())
    }

    /// Get the nth child as f64.
    pub fn f64_at(&self, index: usize) -> Option<f64> {
        self.children().get(index).and_then(|v| v.as_f64())
    }

    /// Short human description used in schema errors.
    pub fn describe(&self) -> String {
        match self {
            SExpr::Atom(s) => format!("atom `{s}`"),
            SExpr::Number(n) => format!("number {}", format_number(*n)),
            SExpr::String(s) => format!("string {:?}", s),
            SExpr::List(_) => match self.tag() {
                Some(tag) => format!("list `({tag} ...)`"),
                None => "list".to_string(),
            },
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_infinite() {
        // Keeps overflowed literals re-readable as numbers.
        if n > 0.0 { "1e999" } else { "-1e999" }.to_string()
    } else {
        n.to_string()
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExpr::Atom(s) => f.write_str(s),
            SExpr::Number(n) => f.write_str(&format_number(*n)),
            SExpr::String(s) => write_quoted(f, s),
            SExpr::List(list) => {
                f.write_char('(')?;
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(' ')?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(')')
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_simple_list() {
        let result = parse("(hello world)").unwrap();
        assert_eq!(result.tag(), Some("hello"));
        assert_eq!(result.text_at(0).as_deref(), Some("world"));
    }

    #[test]
    fn test_nested() {
        let result = parse("(a (b 1) (c 2))").unwrap();
        assert_eq!(result.tag(), Some("a"));
        assert_eq!(result.value("b").as_deref(), Some("1"));
        assert_eq!(result.find("c").and_then(|c| c.f64_at(0)), Some(2.0));
    }

    #[test]
    fn test_string() {
        let result = parse("(layer \"F.Cu\")").unwrap();
        assert_eq!(result.value("layer"), None);
        assert_eq!(result.children()[0], SExpr::String("F.Cu".into()));
    }

    #[test]
    fn test_float() {
        let result = parse("(at 100.5 50.3 90)").unwrap();
        assert_eq!(result.f64_at(0), Some(100.5));
        assert_eq!(result.f64_at(1), Some(50.3));
        assert_eq!(result.f64_at(2), Some(90.0));
    }

    #[test]
    fn test_find_all() {
        let result = parse("(root (net 0 \"\") (net 1 \"GND\") (net 2 \"VCC\"))").unwrap();
        assert_eq!(result.find_all("net").count(), 3);
    }

    #[test]
    fn test_list_offsets_ignored_by_equality() {
        let a = parse("(a (b))").unwrap();
        let b = parse("  (a\n   (b))").unwrap();
        assert_eq!(a, b);
        assert_eq!(b.offset(), Some(2));
        assert_eq!(b.children()[0].offset(), Some(7));
    }

    #[rstest]
    #[case("(kicad_sch (version 20230121) (generator eeschema))")]
    #[case("(a \"quote \\\" and \\\\ slash\" \"line\\nbreak\")")]
    #[case("(at -1.27 +2.5 1e3 .5 7.)")]
    #[case("(property \"Reference\" \"R1\" (at 0 0 0) (effects (font (size 1.27 1.27)) hide))")]
    #[case("(a () (()) \"\" b-c ~ *.Cu)")]
    #[case("(overflow 1e999 -1e999)")]
    fn test_round_trip(#[case] input: &str) {
        let tree = parse(input).unwrap();
        let text = tree.to_string();
        let again = parse(&text).unwrap();
        assert_eq!(tree, again, "re-serialized as {text}");
    }

    #[test]
    fn test_number_text_renders_integer() {
        let result = parse("(pad 1 smd rect)").unwrap();
        assert_eq!(result.children()[0], SExpr::Number(1.0));
        assert_eq!(result.text_at(0).as_deref(), Some("1"));
    }
}
