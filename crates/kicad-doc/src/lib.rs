pub mod bounds;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod parsers;
pub mod sexpr;
pub mod types;

use error::{Diagnostic, DocError};
use serde::Serialize;
use std::path::Path;
use types::{Document, DocumentKind};

/// A bound document plus the non-fatal problems found while binding it.
#[derive(Debug, Clone, Serialize)]
pub struct Loaded {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
}

/// Detect document kind from file extension.
pub fn detect_kind(path: &Path) -> Option<DocumentKind> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("kicad_sch") => Some(DocumentKind::Schematic),
        Some("kicad_pcb") => Some(DocumentKind::Board),
        _ => None,
    }
}

/// Parse and bind KiCad source text.
pub fn load_str(text: &str) -> Result<Loaded, DocError> {
    let root = sexpr::parse(text)?;
    let (document, diagnostics) = parsers::bind(&root)?;
    log::info!(
        "loaded {:?} with {} entities, {} diagnostics",
        document.kind(),
        document.entities.len(),
        diagnostics.len()
    );
    Ok(Loaded {
        document,
        diagnostics,
    })
}

/// Parse from bytes. Invalid UTF-8 is replaced rather than rejected.
pub fn load_bytes(data: &[u8]) -> Result<Loaded, DocError> {
    let text = String::from_utf8_lossy(data);
    load_str(&text)
}

/// Check the extension, read the file and parse it.
pub fn load_path(path: &Path) -> Result<Loaded, DocError> {
    let kind = detect_kind(path).ok_or_else(|| {
        DocError::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        )
    })?;
    let data = std::fs::read(path)?;
    let loaded = load_bytes(&data)?;
    if loaded.document.kind() != kind {
        log::warn!(
            "{} holds a {:?} despite its extension",
            path.display(),
            loaded.document.kind()
        );
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::types::{Entity, EntityId};
    use rstest::rstest;

    #[rstest]
    #[case("board.kicad_pcb", Some(DocumentKind::Board))]
    #[case("top.KICAD_SCH", Some(DocumentKind::Schematic))]
    #[case("project.kicad_pro", None)]
    #[case("README", None)]
    fn test_detect_kind(#[case] name: &str, #[case] expected: Option<DocumentKind>) {
        assert_eq!(detect_kind(Path::new(name)), expected);
    }

    #[test]
    fn test_bad_pin_drops_only_that_pin() {
        let text = r#"(kicad_sch
  (lib_symbols
    (symbol "L:U"
      (pin "1" (at "x" 0 0))
      (pin "2" (at 0 0 0))))
  (symbol (lib_id "L:U") (at 0 0 0) (uuid u1)))"#;
        let loaded = load_str(text).unwrap();
        let sym = loaded.document.lib_symbol("L:U").unwrap();
        let pins: Vec<_> = sym.pins().collect();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].name, "2");
        assert_eq!(pins[0].length, 2.54);
        assert!(matches!(loaded.document.get(EntityId(0)), Some(Entity::Symbol(_))));
        let schema: Vec<&SchemaError> = loaded
            .diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Schema(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].head, "at");
    }

    #[test]
    fn test_syntax_errors_are_fatal() {
        assert!(matches!(load_str("(kicad_sch"), Err(DocError::Parse(_))));
        assert!(matches!(
            load_str("(kicad_sch (title \"open"),
            Err(DocError::Lex(_))
        ));
        assert!(matches!(load_str(""), Err(DocError::Parse(_))));
    }

    #[test]
    fn test_load_path_rejects_unknown_extension() {
        let err = load_path(Path::new("board.brd")).unwrap_err();
        assert!(matches!(err, DocError::UnsupportedFormat(ext) if ext == "brd"));
    }

    #[test]
    fn test_loaded_serializes() {
        let loaded = load_str("(kicad_pcb (net 0 \"\") (via (at 1 2) (net 7)))").unwrap();
        let json = serde_json::to_value(&loaded).unwrap();
        assert_eq!(json["document"]["body"]["kind"], "board");
        assert_eq!(json["diagnostics"][0]["type"], "dangling");
    }
}
