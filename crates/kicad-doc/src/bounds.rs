//! Per-entity bounding boxes in world coordinates.
//!
//! Every box is unpadded and always contains the entity's anchor point.
//! Hit-test tolerance is added by callers.

use crate::geometry::{BBox, CircleArc, Placement, Point};
use crate::types::*;

/// Renderer default junction diameter when the file says 0.
pub const DEFAULT_JUNCTION_DIAMETER: f64 = 0.9144;
/// Half-size of the no-connect cross.
pub const NO_CONNECT_HALF: f64 = 0.635;
/// Half-size used when a symbol's library entry is missing.
pub const MISSING_SYMBOL_HALF: f64 = 1.27;
/// Half-size of a footprint with no pads or graphics.
pub const EMPTY_FOOTPRINT_HALF: f64 = 0.5;

/// Average glyph advance as a fraction of the font width.
const GLYPH_ADVANCE: f64 = 0.8;

impl Document {
    pub fn entity_bbox(&self, id: EntityId) -> Option<BBox> {
        self.get(id).map(|e| entity_bbox(self, e))
    }

    /// Boxes for every entity, indexed like [`Document::entities`].
    pub fn bboxes(&self) -> Vec<BBox> {
        self.entities.iter().map(|e| entity_bbox(self, e)).collect()
    }

    /// Union of all entity boxes.
    pub fn extent(&self) -> Option<BBox> {
        self.entities
            .iter()
            .map(|e| entity_bbox(self, e))
            .reduce(|a, b| a.union(&b))
    }
}

pub fn entity_bbox(doc: &Document, entity: &Entity) -> BBox {
    let bbox = match entity {
        Entity::Symbol(s) => symbol_bbox(doc, s),
        Entity::Wire(w) => points_bbox(&w.points, w.position()),
        Entity::BusEntry(b) => BBox::new(b.at, b.at + b.size),
        Entity::Junction(j) => {
            let d = if j.diameter > 0.0 {
                j.diameter
            } else {
                DEFAULT_JUNCTION_DIAMETER
            };
            BBox::around(j.at, d / 2.0, d / 2.0)
        }
        Entity::NoConnect(n) => BBox::around(n.at, NO_CONNECT_HALF, NO_CONNECT_HALF),
        Entity::Label(l) => label_bbox(l),
        Entity::Text(t) => text_bbox(t),
        Entity::Sheet(s) => {
            let mut b = BBox::new(s.at, s.at + s.size);
            for pin in &s.pins {
                b.expand_point(pin.at);
            }
            b
        }
        Entity::Graphic(g) => graphic_bbox(g),
        Entity::Footprint(f) => footprint_bbox(f),
        Entity::Track(t) => track_bbox(t),
        Entity::Via(v) => BBox::around(v.at, v.size / 2.0, v.size / 2.0),
        Entity::Zone(z) => points_bbox(&z.outline, z.position()),
    };
    let mut bbox = bbox;
    bbox.expand_point(entity.position());
    bbox
}

fn points_bbox(points: &[Point], fallback: Point) -> BBox {
    BBox::from_points(points.iter().copied()).unwrap_or_else(|| BBox::from_point(fallback))
}

/// Geometry box of a shape, ignoring stroke width.
pub fn shape_bbox(shape: &Shape) -> BBox {
    match shape {
        Shape::Line { start, end } | Shape::Rect { start, end } => BBox::new(*start, *end),
        Shape::Circle { center, radius } => BBox::around(*center, *radius, *radius),
        Shape::Arc { start, mid, end } => match CircleArc::from_three_points(*start, *mid, *end) {
            Some(arc) => arc.bbox(),
            None => points_bbox(&[*start, *mid, *end], *start),
        },
        // Bezier curves stay inside their control polygon.
        Shape::Polyline { points } | Shape::Polygon { points } | Shape::Bezier { points } => {
            points_bbox(points, shape.anchor())
        }
    }
}

pub fn graphic_bbox(g: &Graphic) -> BBox {
    shape_bbox(&g.shape).grow(g.stroke.width / 2.0)
}

// ─── Symbols ─────────────────────────────────────────────────────────

/// Library coordinates are y-up; schematic coordinates are y-down.
fn flip(p: Point) -> Point {
    Point::new(p.x, -p.y)
}

fn flip_bbox(b: &BBox) -> BBox {
    BBox::new(flip(b.min), flip(b.max))
}

/// Box of the drawn unit in symbol-local, y-down coordinates.
pub fn lib_symbol_bbox(sym: &LibSymbol, unit: u32, style: u32) -> Option<BBox> {
    let mut out: Option<BBox> = None;
    let mut add = |b: BBox| {
        out = Some(match out {
            Some(o) => o.union(&b),
            None => b,
        })
    };
    for u in sym.units_for(unit, style) {
        for g in &u.graphics {
            add(flip_bbox(&graphic_bbox(g)));
        }
        for pin in &u.pins {
            add(BBox::new(flip(pin.at), flip(pin.tip())));
        }
    }
    out
}

fn symbol_bbox(doc: &Document, s: &SymbolInstance) -> BBox {
    let local = doc
        .lib_symbol(s.lib_key())
        .and_then(|sym| lib_symbol_bbox(sym, s.unit, s.style));
    match local {
        Some(local) => Placement::new(s.at, s.rotation)
            .with_mirror(s.mirror)
            .apply_bbox(&local),
        None => BBox::around(s.at, MISSING_SYMBOL_HALF, MISSING_SYMBOL_HALF),
    }
}

// ─── Text ────────────────────────────────────────────────────────────

/// Estimated width and height of a single- or multi-line string.
pub fn text_extent(text: &str, effects: &Effects) -> (f64, f64) {
    let lines: Vec<&str> = text.split('\n').collect();
    let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let width = longest as f64 * effects.font_size.x * GLYPH_ADVANCE;
    let height = lines.len().max(1) as f64 * effects.font_size.y;
    (width, height)
}

/// Local text box relative to its anchor, honouring justification.
/// `default_left` selects the label convention of a left/bottom anchor.
fn justified_box(w: f64, h: f64, effects: &Effects, default_left: bool) -> BBox {
    let has = |j: &str| effects.justify.iter().any(|s| s == j);
    let (x0, x1) = if has("right") {
        (-w, 0.0)
    } else if has("left") || default_left {
        (0.0, w)
    } else {
        (-w / 2.0, w / 2.0)
    };
    let (y0, y1) = if has("top") {
        (0.0, h)
    } else if has("bottom") || default_left {
        (-h, 0.0)
    } else {
        (-h / 2.0, h / 2.0)
    };
    BBox::new(Point::new(x0, y0), Point::new(x1, y1))
}

pub fn text_bbox(t: &Text) -> BBox {
    let (w, h) = text_extent(&t.text, &t.effects);
    let local = justified_box(w, h, &t.effects, false);
    Placement::new(t.at, t.rotation).apply_bbox(&local)
}

fn label_bbox(l: &Label) -> BBox {
    let (w, h) = text_extent(&l.text, &l.effects);
    let local = match l.kind {
        LabelKind::Local => justified_box(w, h, &l.effects, true),
        // Flag outline adds about one text height on each side.
        LabelKind::Global | LabelKind::Hierarchical => {
            BBox::new(Point::new(0.0, -h), Point::new(w + 2.0 * h, h))
        }
        LabelKind::Directive => {
            let len = l.length.unwrap_or(2.54);
            BBox::new(Point::new(-h, -len - h), Point::new(h.max(w), 0.0))
        }
    };
    Placement::new(l.at, l.rotation).apply_bbox(&local)
}

// ─── Board items ─────────────────────────────────────────────────────

/// World box of one pad of a footprint.
pub fn pad_bbox(fp: &Footprint, pad: &Pad) -> BBox {
    let center = Placement::new(fp.at, fp.rotation).apply(pad.at);
    let local = BBox::around(Point::ORIGIN, pad.size.x / 2.0, pad.size.y / 2.0);
    Placement::new(center, pad.rotation).apply_bbox(&local)
}

fn footprint_bbox(f: &Footprint) -> BBox {
    let place = Placement::new(f.at, f.rotation);
    let pads = f.pads.iter().map(|p| pad_bbox(f, p));
    let graphics = f.graphics.iter().map(|g| place.apply_bbox(&graphic_bbox(g)));
    pads.chain(graphics)
        .reduce(|a, b| a.union(&b))
        .unwrap_or_else(|| BBox::around(f.at, EMPTY_FOOTPRINT_HALF, EMPTY_FOOTPRINT_HALF))
}

fn track_bbox(t: &Track) -> BBox {
    let core = match &t.shape {
        TrackShape::Line => BBox::new(t.start, t.end),
        TrackShape::Arc { mid } => shape_bbox(&Shape::Arc {
            start: t.start,
            mid: *mid,
            end: t.end,
        }),
    };
    core.grow(t.width / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::parse;
    use approx::assert_relative_eq;

    fn load(text: &str) -> Document {
        crate::parsers::bind(&parse(text).unwrap()).unwrap().0
    }

    const RESISTOR: &str = r#"(kicad_sch
  (lib_symbols
    (symbol "Device:R"
      (symbol "R_0_1" (rectangle (start -1.016 -2.54) (end 1.016 2.54) (stroke (width 0.254))))
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2")))))
  (symbol (lib_id "Device:R") (at 100 50 0) (unit 1) (uuid r1))
  (symbol (lib_id "Device:R") (at 100 50 90) (unit 1) (uuid r2))
  (symbol (lib_id "Missing:X") (at 10 10 0) (uuid x1)))"#;

    #[test]
    fn test_symbol_bbox_from_body_and_pins() {
        let doc = load(RESISTOR);
        let b = doc.entity_bbox(EntityId(0)).unwrap();
        assert_relative_eq!(b.min.x, 100.0 - 1.016 - 0.127, epsilon = 1e-9);
        assert_relative_eq!(b.max.x, 100.0 + 1.016 + 0.127, epsilon = 1e-9);
        assert_relative_eq!(b.min.y, 50.0 - 3.81, epsilon = 1e-9);
        assert_relative_eq!(b.max.y, 50.0 + 3.81, epsilon = 1e-9);
    }

    #[test]
    fn test_rotated_symbol_bbox() {
        let doc = load(RESISTOR);
        let b = doc.entity_bbox(EntityId(1)).unwrap();
        assert_relative_eq!(b.min.x, 100.0 - 3.81, epsilon = 1e-9);
        assert_relative_eq!(b.max.x, 100.0 + 3.81, epsilon = 1e-9);
        assert_relative_eq!(b.height(), 2.0 * (1.016 + 0.127), epsilon = 1e-9);
    }

    #[test]
    fn test_missing_lib_symbol_fallback() {
        let doc = load(RESISTOR);
        let b = doc.entity_bbox(EntityId(2)).unwrap();
        assert_eq!(b, BBox::around(Point::new(10.0, 10.0), 1.27, 1.27));
    }

    #[test]
    fn test_every_anchor_inside_its_box() {
        let doc = load(
            r#"(kicad_sch
  (wire (pts (xy 0 0) (xy 10 0)))
  (bus_entry (at 5 5) (size -2.54 2.54))
  (junction (at 3 3))
  (no_connect (at 4 4))
  (label "NET" (at 1 1 180))
  (global_label "G" (shape input) (at 2 2 90))
  (netclass_flag "" (length 2.54) (shape round) (at 3 3 0))
  (text "note" (at 20 20 0))
  (polyline (pts (xy 1 1) (xy 2 2)))
  (sheet (at 30 30) (size 10 10) (uuid s) (property "Sheetfile" "a.kicad_sch")))"#,
        );
        for (id, entity) in doc.iter() {
            let b = doc.entity_bbox(id).unwrap();
            assert!(
                b.contains(entity.position()),
                "{} {:?} misses its anchor",
                entity.type_name(),
                b
            );
            assert!(b.min.x <= b.max.x && b.min.y <= b.max.y);
        }
    }

    #[test]
    fn test_junction_default_diameter() {
        let doc = load("(kicad_sch (junction (at 0 0) (diameter 0)))");
        let b = doc.entity_bbox(EntityId(0)).unwrap();
        assert_relative_eq!(b.width(), DEFAULT_JUNCTION_DIAMETER, epsilon = 1e-12);
    }

    #[test]
    fn test_board_boxes() {
        let doc = load(
            r#"(kicad_pcb
  (footprint "L:F" (layer "F.Cu") (at 10 10 90)
    (pad "1" smd rect (at 1 0 90) (size 1 2) (layers "F.Cu")))
  (footprint "L:Empty" (at 0 0))
  (segment (start 0 0) (end 10 0) (width 0.5) (layer "F.Cu"))
  (via (at 5 5) (size 0.8) (drill 0.4) (layers "F.Cu" "B.Cu")))"#,
        );
        let fp = doc.entity_bbox(EntityId(0)).unwrap();
        // Pad centre rotates to (10, 9); its 90 degree turn swaps width and height.
        assert_relative_eq!(fp.min.x, 9.0, epsilon = 1e-9);
        assert_relative_eq!(fp.max.x, 11.0, epsilon = 1e-9);
        assert!(fp.contains(Point::new(10.0, 10.0)));

        let empty = doc.entity_bbox(EntityId(1)).unwrap();
        assert_eq!(empty, BBox::around(Point::ORIGIN, 0.5, 0.5));

        let track = doc.entity_bbox(EntityId(2)).unwrap();
        assert_relative_eq!(track.min.y, -0.25, epsilon = 1e-12);
        assert_relative_eq!(track.max.x, 10.25, epsilon = 1e-12);

        let via = doc.entity_bbox(EntityId(3)).unwrap();
        assert_relative_eq!(via.width(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_extent() {
        let doc = load("(kicad_sch (junction (at 0 0) (diameter 1)) (junction (at 10 5) (diameter 1)))");
        let e = doc.extent().unwrap();
        assert_eq!(e.min, Point::new(-0.5, -0.5));
        assert_eq!(e.max, Point::new(10.5, 5.5));
        assert!(load("(kicad_sch)").extent().is_none());
    }
}
