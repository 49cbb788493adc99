//! Schema binding: generic S-expression tree to typed documents.
//!
//! Every container has a closed grammar table mapping head symbols to binder
//! functions. Heads missing from a table are kept as pass-through lists.

use std::collections::HashMap;

use crate::error::{DanglingReference, Diagnostic, DocError, ReferenceKind, SchemaError};
use crate::sexpr::SExpr;
use crate::types::{Body, Document, Entity, EntityId, Metadata, Positioned};

pub mod board;
pub(crate) mod common;
pub(crate) mod fields;
pub mod schematic;

pub use schematic::bind_pin;

pub type Diagnostics = Vec<Diagnostic>;

/// Binds one top-level list into an entity. Receives the head it was
/// dispatched on so that one binder can serve several heads.
pub(crate) type EntityBinder = fn(&str, &SExpr, &mut Diagnostics) -> Result<Entity, SchemaError>;

/// Binds one child list into a container under construction.
pub(crate) type Rule<T> = (
    &'static str,
    fn(&mut T, &SExpr, &mut Diagnostics) -> Result<(), SchemaError>,
);

/// Apply `rules` to `children`. A failing rule drops only that child and
/// records a diagnostic; unknown heads come back as pass-through.
pub(crate) fn dispatch<'a, T>(
    target: &mut T,
    children: impl IntoIterator<Item = &'a SExpr>,
    rules: &[Rule<T>],
    diags: &mut Diagnostics,
) -> Vec<SExpr> {
    let mut extra = Vec::new();
    for child in children {
        let Some(head) = child.tag() else {
            if child.is_list() {
                extra.push(child.clone());
            }
            continue;
        };
        match rules.iter().find(|(h, _)| *h == head) {
            Some((_, bind)) => {
                if let Err(err) = bind(target, child, diags) {
                    log::warn!("dropping `{head}`: {err}");
                    diags.push(Diagnostic::Schema(err.within(head)));
                }
            }
            None => {
                log::debug!("passing through `{head}`");
                extra.push(child.clone());
            }
        }
    }
    extra
}

/// Root-level state shared by the schematic and board binders.
pub(crate) struct Builder<B> {
    pub metadata: Metadata,
    pub body: B,
    pub entities: Vec<Entity>,
    pub ids: HashMap<String, EntityId>,
    pub extra: Vec<SExpr>,
    pub diags: Diagnostics,
}

impl<B: Default> Builder<B> {
    pub fn new() -> Self {
        Self {
            metadata: Metadata::default(),
            body: B::default(),
            entities: Vec::new(),
            ids: HashMap::new(),
            extra: Vec::new(),
            diags: Vec::new(),
        }
    }
}

impl<B> Builder<B> {
    /// Append an entity in draw order and register its uuid.
    pub fn push(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        if let Some(uuid) = entity.uuid() {
            if self.ids.contains_key(uuid) {
                log::warn!("duplicate uuid {uuid} on {}", entity.type_name());
                self.diags.push(Diagnostic::Dangling(DanglingReference {
                    kind: ReferenceKind::DuplicateId,
                    id: uuid.to_string(),
                    entity: Some(id),
                }));
            } else {
                self.ids.insert(uuid.to_string(), id);
            }
        }
        self.entities.push(entity);
        id
    }

    pub fn dangling(&mut self, kind: ReferenceKind, id: impl Into<String>, entity: Option<EntityId>) {
        let id = id.into();
        log::warn!("dangling {kind:?} reference `{id}`");
        self.diags.push(Diagnostic::Dangling(DanglingReference { kind, id, entity }));
    }

    /// Walk the root list: metadata rules first, then entity binders, then
    /// pass-through.
    pub fn walk(
        &mut self,
        root: &SExpr,
        metadata: &[Rule<Builder<B>>],
        entities: &[(&'static str, EntityBinder)],
    ) {
        for child in root.children() {
            let Some(head) = child.tag() else {
                if child.is_list() {
                    self.extra.push(child.clone());
                }
                continue;
            };
            if let Some((_, rule)) = metadata.iter().find(|(h, _)| *h == head) {
                let mut diags = std::mem::take(&mut self.diags);
                let result = rule(self, child, &mut diags);
                diags.append(&mut self.diags);
                self.diags = diags;
                if let Err(err) = result {
                    log::warn!("ignoring `{head}`: {err}");
                    self.diags.push(Diagnostic::Schema(err));
                }
            } else if let Some((_, bind)) = entities.iter().find(|(h, _)| *h == head) {
                match bind(head, child, &mut self.diags) {
                    Ok(entity) => {
                        self.push(entity);
                    }
                    Err(err) => {
                        log::warn!("dropping `{head}`: {err}");
                        self.diags.push(Diagnostic::Schema(err.within(head)));
                    }
                }
            } else {
                log::debug!("passing through top-level `{head}`");
                self.extra.push(child.clone());
            }
        }
    }

    pub fn finish(self, body: impl FnOnce(B) -> Body) -> (Document, Diagnostics) {
        let document = Document {
            metadata: self.metadata,
            body: body(self.body),
            entities: self.entities,
            ids: self.ids,
            extra: self.extra,
        };
        (document, self.diags)
    }
}

// ─── Metadata rules shared by both roots ─────────────────────────────

fn first_text(node: &SExpr) -> Result<String, SchemaError> {
    node.text_at(0)
        .map(|t| t.into_owned())
        .ok_or_else(|| SchemaError::new(node.tag().unwrap_or("?"), node, "missing value"))
}

pub(crate) fn version<B>(b: &mut Builder<B>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    b.metadata.version = Some(first_text(node)?);
    Ok(())
}

pub(crate) fn generator<B>(b: &mut Builder<B>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    b.metadata.generator = Some(first_text(node)?);
    Ok(())
}

pub(crate) fn generator_version<B>(
    b: &mut Builder<B>,
    node: &SExpr,
    _: &mut Diagnostics,
) -> Result<(), SchemaError> {
    b.metadata.generator_version = Some(first_text(node)?);
    Ok(())
}

pub(crate) fn paper<B>(b: &mut Builder<B>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    b.metadata.paper = Some(first_text(node)?);
    Ok(())
}

pub(crate) fn uuid<B>(b: &mut Builder<B>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    b.metadata.uuid = Some(first_text(node)?);
    Ok(())
}

pub(crate) fn title_block<B>(b: &mut Builder<B>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let tb = &mut b.metadata.title_block;
    let text = |tag: &str| node.value(tag).map(|v| v.into_owned()).unwrap_or_default();
    tb.title = text("title");
    tb.date = text("date");
    tb.revision = text("rev");
    tb.company = text("company");
    for comment in node.find_all("comment") {
        let n = fields::number_at("comment", comment, 0, "comment number")? as u32;
        let body = comment.text_at(1).map(|t| t.into_owned()).unwrap_or_default();
        tb.comments.push((n, body));
    }
    Ok(())
}

/// Bind a parsed root list into a document.
pub fn bind(root: &SExpr) -> Result<(Document, Diagnostics), DocError> {
    match root.tag() {
        Some("kicad_sch") => Ok(schematic::bind(root)),
        Some("kicad_pcb") => Ok(board::bind(root)),
        Some(other) => Err(DocError::NotKicad(other.to_string())),
        None => Err(DocError::NotKicad(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::parse;

    struct Counter {
        seen: Vec<String>,
    }

    fn good(c: &mut Counter, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
        c.seen.push(node.text_at(0).unwrap_or_default().into_owned());
        Ok(())
    }

    fn bad(_: &mut Counter, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
        Err(SchemaError::new("bad", node, "always fails"))
    }

    #[test]
    fn test_dispatch_recovers_and_passes_through() {
        let node = parse("(c (good a) (bad x) (other 1) (good b))").unwrap();
        let rules: &[Rule<Counter>] = &[("good", good), ("bad", bad)];
        let mut c = Counter { seen: vec![] };
        let mut diags = Vec::new();
        let extra = dispatch(&mut c, node.children(), rules, &mut diags);
        assert_eq!(c.seen, vec!["a", "b"]);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].tag(), Some("other"));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_bind_rejects_foreign_root() {
        let root = parse("(fp_lib_table (lib))").unwrap();
        assert!(matches!(bind(&root), Err(DocError::NotKicad(h)) if h == "fp_lib_table"));
    }

    #[test]
    fn test_title_block() {
        let root = parse(
            "(kicad_sch (version 20231120) (title_block (title \"Main\") (rev \"B\") (comment 1 \"first\")))",
        )
        .unwrap();
        let (doc, diags) = bind(&root).unwrap();
        assert!(diags.is_empty());
        assert_eq!(doc.metadata.version.as_deref(), Some("20231120"));
        assert_eq!(doc.metadata.title_block.title, "Main");
        assert_eq!(doc.metadata.title_block.revision, "B");
        assert_eq!(doc.metadata.title_block.comments, vec![(1, "first".to_string())]);
    }
}
