//! Multi-sheet schematic hierarchy.
//!
//! A sheet instance names a sub-schematic file. The same file may be placed
//! many times; each placement is told apart by its instance path, the chain of
//! sheet uuids from the root (`/root-uuid/sheet-uuid/...`).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{NotFoundError, UnresolvedReason, UnresolvedSheetError};
use crate::types::{Document, DocumentKind, EntityId, Sheet};
use crate::Loaded;

/// Chain of sheet uuids identifying one placement of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InstancePath(String);

impl InstancePath {
    /// `/` when the root document has no uuid, `/uuid` otherwise.
    pub fn root(doc: &Document) -> Self {
        match doc.metadata.uuid.as_deref() {
            Some(uuid) => InstancePath(format!("/{uuid}")),
            None => InstancePath("/".to_string()),
        }
    }

    pub fn join(&self, uuid: &str) -> Self {
        if self.0 == "/" {
            InstancePath(format!("/{uuid}"))
        } else {
            InstancePath(format!("{}/{uuid}", self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of uuid segments.
    pub fn depth(&self) -> usize {
        self.0.split('/').filter(|s| !s.is_empty()).count()
    }
}

impl From<&str> for InstancePath {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            InstancePath("/".to_string())
        } else {
            InstancePath(s.to_string())
        }
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Sources ─────────────────────────────────────────────────────────

/// Host-supplied access to sheet files by name.
pub trait SheetSource {
    fn fetch(&mut self, file: &str) -> Result<Vec<u8>, NotFoundError>;
}

impl<F> SheetSource for F
where
    F: FnMut(&str) -> Result<Vec<u8>, NotFoundError>,
{
    fn fetch(&mut self, file: &str) -> Result<Vec<u8>, NotFoundError> {
        self(file)
    }
}

/// Sheet files next to the root schematic on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory containing `file`, or the current one.
    pub fn beside(file: &Path) -> Self {
        Self::new(file.parent().unwrap_or_else(|| Path::new(".")))
    }
}

impl SheetSource for DirectorySource {
    fn fetch(&mut self, file: &str) -> Result<Vec<u8>, NotFoundError> {
        let path = self.dir.join(file);
        std::fs::read(&path).map_err(|err| {
            log::debug!("cannot read {}: {err}", path.display());
            NotFoundError::new(file)
        })
    }
}

/// Sheet files held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }

    pub fn with(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }
}

impl SheetSource for MemorySource {
    fn fetch(&mut self, file: &str) -> Result<Vec<u8>, NotFoundError> {
        self.files
            .get(file)
            .cloned()
            .ok_or_else(|| NotFoundError::new(file))
    }
}

// ─── Resolver ────────────────────────────────────────────────────────

/// A sheet instance with its sub-document loaded.
#[derive(Debug, Clone)]
pub struct ResolvedSheet {
    pub file: String,
    pub path: InstancePath,
    pub loaded: Arc<Loaded>,
}

/// One node of the sheet tree.
#[derive(Debug, Clone, Serialize)]
pub struct SheetNode {
    pub path: InstancePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Sheet entity in the parent document; `None` for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
    /// The sub-document could not be obtained; this node is a placeholder.
    pub unresolved: bool,
    pub children: Vec<SheetNode>,
}

impl SheetNode {
    /// Depth-first iteration over this node and its descendants.
    pub fn walk(&self) -> Vec<&SheetNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetTree {
    pub root: SheetNode,
    pub errors: Vec<UnresolvedSheetError>,
}

/// Loads and caches sub-schematics for one root document.
pub struct HierarchyResolver<S> {
    root: Arc<Loaded>,
    root_file: String,
    source: S,
    cache: HashMap<String, Result<Arc<Loaded>, UnresolvedReason>>,
}

impl<S: SheetSource> HierarchyResolver<S> {
    pub fn new(root: Arc<Loaded>, root_file: impl Into<String>, source: S) -> Self {
        Self {
            root,
            root_file: root_file.into(),
            source,
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Arc<Loaded> {
        &self.root
    }

    pub fn root_path(&self) -> InstancePath {
        InstancePath::root(&self.root.document)
    }

    /// Number of distinct files fetched so far, failures included.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a sheet placed directly under `parent`.
    pub fn resolve(
        &mut self,
        sheet: &Sheet,
        parent: &InstancePath,
    ) -> Result<ResolvedSheet, UnresolvedSheetError> {
        let ancestors = [self.root_file.clone()];
        self.resolve_within(sheet, parent, &ancestors)
    }

    /// Resolve a sheet whose ancestor chain of file names is `ancestors`.
    pub fn resolve_within(
        &mut self,
        sheet: &Sheet,
        parent: &InstancePath,
        ancestors: &[String],
    ) -> Result<ResolvedSheet, UnresolvedSheetError> {
        let path = parent.join(&sheet.uuid);
        let fail = |reason| {
            let err = UnresolvedSheetError {
                file: sheet.file.clone(),
                path: path.clone(),
                reason,
            };
            log::warn!("{err}");
            err
        };
        if ancestors.iter().any(|a| a == &sheet.file) {
            return Err(fail(UnresolvedReason::Recursive));
        }
        match self.load(&sheet.file) {
            Ok(loaded) => Ok(ResolvedSheet {
                file: sheet.file.clone(),
                path: path.clone(),
                loaded,
            }),
            Err(reason) => Err(fail(reason)),
        }
    }

    fn load(&mut self, file: &str) -> Result<Arc<Loaded>, UnresolvedReason> {
        if let Some(hit) = self.cache.get(file) {
            log::debug!("sheet cache hit for {file}");
            return hit.clone();
        }
        let result = self
            .source
            .fetch(file)
            .map_err(|_| UnresolvedReason::NotFound)
            .and_then(|bytes| {
                crate::load_bytes(&bytes).map_err(|e| UnresolvedReason::Invalid(e.to_string()))
            })
            .and_then(|loaded| match loaded.document.kind() {
                DocumentKind::Schematic => Ok(Arc::new(loaded)),
                DocumentKind::Board => {
                    Err(UnresolvedReason::Invalid("not a schematic".to_string()))
                }
            });
        if result.is_ok() {
            log::info!("loaded sheet file {file}");
        }
        self.cache.insert(file.to_string(), result.clone());
        result
    }

    /// Walk the whole hierarchy from the root.
    pub fn tree(&mut self) -> SheetTree {
        let root_doc = Arc::clone(&self.root);
        let root_path = self.root_path();
        let mut seen = HashSet::from([root_path.clone()]);
        let mut errors = Vec::new();
        let mut ancestors = vec![self.root_file.clone()];
        let children = self.children_of(
            &root_doc.document,
            &root_path,
            &mut ancestors,
            &mut seen,
            &mut errors,
        );
        let root = SheetNode {
            path: root_path.clone(),
            name: None,
            file: self.root_file.clone(),
            page: root_page(&root_doc.document, &root_path),
            entity: None,
            unresolved: false,
            children,
        };
        SheetTree { root, errors }
    }

    fn children_of(
        &mut self,
        doc: &Document,
        parent: &InstancePath,
        ancestors: &mut Vec<String>,
        seen: &mut HashSet<InstancePath>,
        errors: &mut Vec<UnresolvedSheetError>,
    ) -> Vec<SheetNode> {
        let mut out = Vec::new();
        for (id, sheet) in doc.sheets() {
            let path = parent.join(&sheet.uuid);
            if !seen.insert(path.clone()) {
                let err = UnresolvedSheetError {
                    file: sheet.file.clone(),
                    path,
                    reason: UnresolvedReason::DuplicatePath,
                };
                log::warn!("{err}");
                errors.push(err);
                continue;
            }
            let mut node = SheetNode {
                path: path.clone(),
                name: Some(sheet.name.clone()).filter(|n| !n.is_empty()),
                file: sheet.file.clone(),
                page: sheet_page(doc, sheet, parent, &path),
                entity: Some(id),
                unresolved: false,
                children: Vec::new(),
            };
            match self.resolve_within(sheet, parent, ancestors) {
                Ok(resolved) => {
                    ancestors.push(resolved.file.clone());
                    node.children = self.children_of(
                        &resolved.loaded.document,
                        &resolved.path,
                        ancestors,
                        seen,
                        errors,
                    );
                    ancestors.pop();
                }
                Err(err) => {
                    node.unresolved = true;
                    errors.push(err);
                }
            }
            out.push(node);
        }
        out
    }
}

/// Page number of a sheet placement, from its own instance list or the
/// legacy `sheet_instances` table.
fn sheet_page(doc: &Document, sheet: &Sheet, parent: &InstancePath, path: &InstancePath) -> Option<String> {
    sheet
        .instances
        .iter()
        .find(|i| i.path == parent.as_str() || i.path == path.as_str())
        .and_then(|i| i.page.clone())
        .or_else(|| legacy_page(doc, &format!("/{}", sheet.uuid)))
}

fn root_page(doc: &Document, path: &InstancePath) -> Option<String> {
    legacy_page(doc, "/").or_else(|| legacy_page(doc, path.as_str()))
}

fn legacy_page(doc: &Document, path: &str) -> Option<String> {
    doc.schematic()?
        .sheet_instances
        .iter()
        .find(|r| r.path == path)
        .and_then(|r| r.page.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostic;

    const ROOT: &str = r#"(kicad_sch (uuid "root")
  (sheet (at 0 0) (size 10 10) (uuid "s1")
    (property "Sheetname" "Left") (property "Sheetfile" "child.kicad_sch")
    (instances (project "p" (path "/root" (page "2")))))
  (sheet (at 20 0) (size 10 10) (uuid "s2")
    (property "Sheetname" "Right") (property "Sheetfile" "child.kicad_sch"))
  (sheet (at 40 0) (size 10 10) (uuid "s3")
    (property "Sheetname" "Gone") (property "Sheetfile" "missing.kicad_sch")))"#;

    const CHILD: &str = r#"(kicad_sch (uuid "child")
  (symbol (lib_id "Device:R") (at 0 0 0) (uuid "r1")
    (property "Reference" "R?")
    (instances (project "p"
      (path "/root/s1" (reference "R1") (unit 1))
      (path "/root/s2" (reference "R2") (unit 1))))))"#;

    fn root() -> Arc<Loaded> {
        Arc::new(crate::load_str(ROOT).unwrap())
    }

    #[test]
    fn test_instance_path_join() {
        let root = InstancePath::from("/");
        assert_eq!(root.join("a").as_str(), "/a");
        assert_eq!(root.join("a").join("b").to_string(), "/a/b");
        assert_eq!(root.join("a").join("b").depth(), 2);
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn test_same_file_twice_gets_distinct_paths() {
        let source = MemorySource::new().with("child.kicad_sch", CHILD);
        let mut resolver = HierarchyResolver::new(root(), "root.kicad_sch", source);
        let tree = resolver.tree();

        let paths: Vec<&str> = tree.root.walk().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/root", "/root/s1", "/root/s2", "/root/s3"]);
        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(unique.len(), paths.len());

        // child.kicad_sch fetched once, missing.kicad_sch cached as a failure.
        assert_eq!(resolver.cached(), 2);
        assert_eq!(tree.errors.len(), 1);
        assert_eq!(tree.errors[0].reason, UnresolvedReason::NotFound);
        assert!(tree.root.children[2].unresolved);
        assert_eq!(tree.root.children[0].page.as_deref(), Some("2"));
        assert_eq!(tree.root.children[0].name.as_deref(), Some("Left"));

        let root = Arc::clone(resolver.root());
        let parent = resolver.root_path();
        let sheets: Vec<_> = root.document.sheets().take(2).map(|(_, s)| s).collect();
        let a = resolver.resolve(sheets[0], &parent).unwrap();
        let b = resolver.resolve(sheets[1], &parent).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(a.loaded.document, b.loaded.document);
        assert!(Arc::ptr_eq(&a.loaded, &b.loaded));
    }

    #[test]
    fn test_reference_per_instance_path() {
        let source = MemorySource::new().with("child.kicad_sch", CHILD);
        let mut resolver = HierarchyResolver::new(root(), "root.kicad_sch", source);
        let root = Arc::clone(resolver.root());
        let parent = resolver.root_path();
        let mut refs = Vec::new();
        for (_, sheet) in root.document.sheets().take(2) {
            let resolved = resolver.resolve(sheet, &parent).unwrap();
            let doc = &resolved.loaded.document;
            let (_, symbol) = doc
                .iter()
                .find_map(|(id, e)| match e {
                    crate::types::Entity::Symbol(s) => Some((id, s)),
                    _ => None,
                })
                .unwrap();
            refs.push(doc.reference_for(symbol, resolved.path.as_str()).unwrap());
        }
        assert_eq!(refs, vec!["R1", "R2"]);
    }

    #[test]
    fn test_recursive_sheet_is_unresolved() {
        let selfref = r#"(kicad_sch (uuid "top")
  (sheet (at 0 0) (size 1 1) (uuid "a") (property "Sheetfile" "top.kicad_sch")))"#;
        let loaded = Arc::new(crate::load_str(selfref).unwrap());
        let source = MemorySource::new().with("top.kicad_sch", selfref);
        let mut resolver = HierarchyResolver::new(loaded, "top.kicad_sch", source);
        let tree = resolver.tree();
        assert_eq!(tree.errors.len(), 1);
        assert_eq!(tree.errors[0].reason, UnresolvedReason::Recursive);
        assert_eq!(tree.errors[0].path.as_str(), "/top/a");
        assert!(tree.root.children[0].unresolved);
    }

    #[test]
    fn test_indirect_recursion_stops() {
        let a = r#"(kicad_sch (uuid "ra") (sheet (at 0 0) (size 1 1) (uuid "x") (property "Sheetfile" "b.kicad_sch")))"#;
        let b = r#"(kicad_sch (uuid "rb") (sheet (at 0 0) (size 1 1) (uuid "y") (property "Sheetfile" "a.kicad_sch")))"#;
        let source = MemorySource::new().with("a.kicad_sch", a).with("b.kicad_sch", b);
        let mut resolver =
            HierarchyResolver::new(Arc::new(crate::load_str(a).unwrap()), "a.kicad_sch", source);
        let tree = resolver.tree();
        assert_eq!(tree.errors.len(), 1);
        assert_eq!(tree.errors[0].path.as_str(), "/ra/x/y");
        assert_eq!(tree.errors[0].reason, UnresolvedReason::Recursive);
    }

    #[test]
    fn test_closure_source_and_invalid_file() {
        let mut calls = 0;
        let source = |name: &str| -> Result<Vec<u8>, NotFoundError> {
            calls += 1;
            match name {
                "child.kicad_sch" => Ok(b"(kicad_sch (".to_vec()),
                _ => Err(NotFoundError::new(name)),
            }
        };
        let mut resolver = HierarchyResolver::new(root(), "root.kicad_sch", source);
        let tree = resolver.tree();
        let reasons: Vec<_> = tree.errors.iter().map(|e| &e.reason).collect();
        assert!(matches!(reasons[0], UnresolvedReason::Invalid(_)));
        assert!(matches!(reasons[1], UnresolvedReason::Invalid(_)));
        assert_eq!(reasons[2], &UnresolvedReason::NotFound);
        drop(resolver);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_unresolved_sheet_diagnostic_serializes() {
        let err = UnresolvedSheetError {
            file: "x.kicad_sch".into(),
            path: InstancePath::from("/r/s"),
            reason: UnresolvedReason::NotFound,
        };
        let json = serde_json::to_value(Diagnostic::UnresolvedSheet(err)).unwrap();
        assert_eq!(json["type"], "unresolved_sheet");
        assert_eq!(json["path"], "/r/s");
        assert_eq!(json["reason"]["kind"], "not_found");
    }
}
