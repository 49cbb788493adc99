use std::cell::Cell;

use crate::error::SchemaError;
use crate::geometry::Point;
use crate::sexpr::SExpr;

/// Positional-then-keyword view over one list's children.
///
/// Non-list children are positional. Lists are keyed by their head atom and
/// marked as used when read; whatever is left becomes pass-through.
pub(crate) struct Fields<'a> {
    head: &'a str,
    node: &'a SExpr,
    positional: Vec<&'a SExpr>,
    keyed: Vec<(Option<&'a str>, &'a SExpr, Cell<bool>)>,
}

impl<'a> Fields<'a> {
    pub fn new(head: &'a str, node: &'a SExpr) -> Self {
        let mut positional = Vec::new();
        let mut keyed = Vec::new();
        for child in node.children() {
            if child.is_list() {
                keyed.push((child.tag(), child, Cell::new(false)));
            } else {
                positional.push(child);
            }
        }
        Self {
            head,
            node,
            positional,
            keyed,
        }
    }

    pub fn error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::new(self.head, self.node, reason)
    }

    pub fn positional(&self) -> &[&'a SExpr] {
        &self.positional
    }

    pub fn opt_text(&self, index: usize) -> Option<String> {
        self.positional
            .get(index)
            .and_then(|v| v.text())
            .map(|t| t.into_owned())
    }

    pub fn text(&self, index: usize, what: &str) -> Result<String, SchemaError> {
        self.opt_text(index)
            .ok_or_else(|| self.error(format!("missing {what}")))
    }

    pub fn number(&self, index: usize, what: &str) -> Result<f64, SchemaError> {
        match self.positional.get(index) {
            None => Err(self.error(format!("missing {what}"))),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| self.error(format!("{what} must be a number, got {}", v.describe()))),
        }
    }

    /// First child list with this head.
    pub fn get(&self, head: &str) -> Option<&'a SExpr> {
        self.keyed
            .iter()
            .find(|(h, _, _)| *h == Some(head))
            .map(|(_, node, used)| {
                used.set(true);
                *node
            })
    }

    /// Every child list with this head, in file order.
    pub fn all(&self, head: &str) -> Vec<&'a SExpr> {
        self.keyed
            .iter()
            .filter(|(h, _, _)| *h == Some(head))
            .map(|(_, node, used)| {
                used.set(true);
                *node
            })
            .collect()
    }

    pub fn has(&self, head: &str) -> bool {
        self.get(head).is_some()
    }

    /// Boolean option: bare `name`, `(name)` or `(name yes)`. `(name no)` is false.
    pub fn flag(&self, name: &str) -> bool {
        if self.positional.iter().any(|p| p.as_str() == Some(name)) {
            return true;
        }
        match self.get(name) {
            Some(node) => !matches!(node.text_at(0).as_deref(), Some("no") | Some("false")),
            None => false,
        }
    }

    /// Boolean option that defaults to true when absent.
    pub fn flag_or(&self, name: &str, default: bool) -> bool {
        let present = self.positional.iter().any(|p| p.as_str() == Some(name))
            || self.keyed.iter().any(|(h, _, _)| *h == Some(name));
        if present {
            self.flag(name)
        } else {
            default
        }
    }

    /// Text payload of `(head value)`.
    pub fn kw_text(&self, head: &str) -> Result<Option<String>, SchemaError> {
        match self.get(head) {
            None => Ok(None),
            Some(node) => node
                .text_at(0)
                .map(|t| Some(t.into_owned()))
                .ok_or_else(|| SchemaError::new(head, node, "missing value")),
        }
    }

    /// Numeric payload of `(head value)`.
    pub fn kw_number(&self, head: &str) -> Result<Option<f64>, SchemaError> {
        match self.get(head) {
            None => Ok(None),
            Some(node) => number_at(head, node, 0, "value").map(Some),
        }
    }

    /// Point payload of `(head x y)`.
    pub fn kw_xy(&self, head: &str) -> Result<Option<Point>, SchemaError> {
        match self.get(head) {
            None => Ok(None),
            Some(node) => xy(head, node).map(Some),
        }
    }

    /// `(at x y [angle])`. The angle defaults to 0.
    pub fn at(&self) -> Result<Option<(Point, f64)>, SchemaError> {
        let Some(node) = self.get("at") else {
            return Ok(None);
        };
        let p = xy("at", node)?;
        let rotation = opt_number_at("at", node, 2, "angle")?.unwrap_or(0.0);
        Ok(Some((p, rotation)))
    }

    /// `uuid`, or the legacy `tstamp`.
    pub fn uuid(&self) -> Option<String> {
        let node = self.get("uuid").or_else(|| self.get("tstamp"))?;
        node.text_at(0).map(|t| t.into_owned())
    }

    /// Child lists nobody has read yet.
    pub fn rest(&self) -> Vec<&'a SExpr> {
        self.keyed
            .iter()
            .filter(|(_, _, used)| !used.get())
            .map(|(_, node, _)| *node)
            .collect()
    }

    /// Unread child lists, cloned for pass-through.
    pub fn extra(&self) -> Vec<SExpr> {
        self.rest().into_iter().cloned().collect()
    }
}

pub(crate) fn number_at(head: &str, node: &SExpr, index: usize, what: &str) -> Result<f64, SchemaError> {
    match node.children().get(index) {
        None => Err(SchemaError::new(head, node, format!("missing {what}"))),
        Some(v) => v.as_f64().ok_or_else(|| {
            SchemaError::new(head, node, format!("{what} must be a number, got {}", v.describe()))
        }),
    }
}

/// Like [`number_at`], but an absent child is `None` rather than an error.
pub(crate) fn opt_number_at(
    head: &str,
    node: &SExpr,
    index: usize,
    what: &str,
) -> Result<Option<f64>, SchemaError> {
    if node.children().get(index).is_none() {
        return Ok(None);
    }
    number_at(head, node, index, what).map(Some)
}

/// `(head x y ...)` as a point; both coordinates are required.
pub(crate) fn xy(head: &str, node: &SExpr) -> Result<Point, SchemaError> {
    Ok(Point::new(
        number_at(head, node, 0, "x")?,
        number_at(head, node, 1, "y")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::parse;

    #[test]
    fn test_positional_then_keyword() {
        let node = parse("(pin passive line (at 1 2 90) (length 5) (name \"A\") (foo 1))").unwrap();
        let f = Fields::new("pin", &node);
        assert_eq!(f.opt_text(0).as_deref(), Some("passive"));
        assert_eq!(f.opt_text(1).as_deref(), Some("line"));
        assert_eq!(f.at().unwrap(), Some((Point::new(1.0, 2.0), 90.0)));
        assert_eq!(f.kw_number("length").unwrap(), Some(5.0));
        assert_eq!(f.kw_text("name").unwrap().as_deref(), Some("A"));
        let extra = f.extra();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].tag(), Some("foo"));
    }

    #[test]
    fn test_flags() {
        let node = parse("(effects (font (size 1 1)) hide (bold yes) (italic no))").unwrap();
        let f = Fields::new("effects", &node);
        assert!(f.flag("hide"));
        assert!(f.flag("bold"));
        assert!(!f.flag("italic"));
        assert!(!f.flag("mirror"));
        assert!(f.flag_or("in_bom", true));
    }

    #[test]
    fn test_ill_typed_at() {
        let node = parse("(pin \"1\" (at \"x\" 0 0))").unwrap();
        let f = Fields::new("pin", &node);
        let err = f.at().unwrap_err();
        assert_eq!(err.head, "at");
        assert!(err.reason.contains("x must be a number"), "{}", err.reason);
    }

    #[test]
    fn test_ill_typed_angle() {
        let node = parse("(junction (at 1 2 \"x\"))").unwrap();
        let err = Fields::new("junction", &node).at().unwrap_err();
        assert_eq!(err.head, "at");
        assert!(err.reason.contains("angle must be a number"), "{}", err.reason);

        let node = parse("(junction (at 1 2))").unwrap();
        assert_eq!(Fields::new("junction", &node).at().unwrap(), Some((Point::new(1.0, 2.0), 0.0)));
    }

    #[test]
    fn test_quoted_number_is_rejected() {
        let node = parse("(pin \"1\" (at \"1\" 0 0))").unwrap();
        let err = Fields::new("pin", &node).at().unwrap_err();
        assert!(err.reason.contains("got string"), "{}", err.reason);
    }

    #[test]
    fn test_uuid_or_tstamp() {
        let node = parse("(segment (tstamp abc-1))").unwrap();
        assert_eq!(Fields::new("segment", &node).uuid().as_deref(), Some("abc-1"));
    }
}
