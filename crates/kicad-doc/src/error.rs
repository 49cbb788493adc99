use serde::Serialize;
use thiserror::Error;

use crate::hierarchy::InstancePath;
use crate::sexpr::SExpr;
use crate::types::EntityId;

/// Malformed token stream.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LexError {
    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("unmatched ')' at byte {offset}")]
    UnmatchedClose { offset: usize },

    #[error("unrecognized input at byte {offset}")]
    Unrecognized { offset: usize },
}

impl LexError {
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnterminatedString { offset }
            | LexError::UnmatchedClose { offset }
            | LexError::Unrecognized { offset } => *offset,
        }
    }
}

/// Structural S-expression violation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("parse error at byte {position}: expected {expected}")]
pub struct ParseError {
    pub position: usize,
    pub expected: String,
}

impl ParseError {
    pub fn new(position: usize, expected: impl Into<String>) -> Self {
        Self {
            position,
            expected: expected.into(),
        }
    }
}

/// Either failure of the generic S-expression layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A recognized list with a missing or ill-typed field.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("`{head}` at byte {offset}: {reason} (in `{node}`)")]
pub struct SchemaError {
    /// Head symbol of the entity that was dropped, when it differs from `head`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub head: String,
    pub offset: usize,
    pub node: String,
    pub reason: String,
}

const NODE_EXCERPT: usize = 80;

impl SchemaError {
    pub fn new(head: &str, node: &SExpr, reason: impl Into<String>) -> Self {
        let mut text = node.to_string();
        if text.len() > NODE_EXCERPT {
            let mut cut = NODE_EXCERPT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        Self {
            entity: None,
            head: head.to_string(),
            offset: node.offset().unwrap_or(0),
            node: text,
            reason: reason.into(),
        }
    }

    /// Records which entity was dropped because of this error.
    pub fn within(mut self, entity: &str) -> Self {
        if self.entity.is_none() && self.head != entity {
            self.entity = Some(entity.to_string());
        }
        self
    }
}

/// The host could not supply a requested file.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{file}: not found")]
pub struct NotFoundError {
    pub file: String,
}

impl NotFoundError {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnresolvedReason {
    #[error("file not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("sheet file is one of its own ancestors")]
    Recursive,

    #[error("instance path already used")]
    DuplicatePath,
}

/// A sheet instance whose sub-document could not be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("sheet {path} ({file}): {reason}")]
pub struct UnresolvedSheetError {
    pub file: String,
    pub path: InstancePath,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    LibSymbol,
    Net,
    DuplicateId,
}

/// A cross-reference that does not resolve inside its document.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("dangling {kind:?} reference `{id}`")]
pub struct DanglingReference {
    pub kind: ReferenceKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
}

/// Non-fatal problem reported alongside a loaded document.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error(transparent)]
    Schema(SchemaError),

    #[error(transparent)]
    Dangling(DanglingReference),

    #[error(transparent)]
    UnresolvedSheet(UnresolvedSheetError),
}

/// Failure to produce a document at all.
#[derive(Error, Debug)]
pub enum DocError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("not a KiCad schematic or board (root is `{0}`)")]
    NotKicad(String),

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SyntaxError> for DocError {
    fn from(err: SyntaxError) -> Self {
        match err {
            SyntaxError::Lex(e) => DocError::Lex(e),
            SyntaxError::Parse(e) => DocError::Parse(e),
        }
    }
}

impl DocError {
    /// Byte offset in the source text, for syntax failures.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DocError::Lex(e) => Some(e.offset()),
            DocError::Parse(e) => Some(e.position),
            _ => None,
        }
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let col = offset - before.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1) + 1;
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let text = "(a\n  (b c)\n)";
        assert_eq!(line_col(text, 0), (1, 1));
        assert_eq!(line_col(text, 5), (2, 3));
        assert_eq!(line_col(text, 999), (3, 2));
    }

    #[test]
    fn test_schema_error_truncates_node() {
        let node = SExpr::Atom("x".repeat(200));
        let err = SchemaError::new("pin", &node, "too long");
        assert!(err.node.ends_with("..."));
        assert!(err.node.len() <= NODE_EXCERPT + 3);
    }
}
