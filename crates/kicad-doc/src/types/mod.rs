use std::collections::HashMap;

use indexmap::IndexMap;
use serde::ser::Serializer;
use serde::Serialize;

use crate::geometry::{round_f64, Mirror, Point};
use crate::sexpr::SExpr;

mod board;
mod schematic;

pub use board::*;
pub use schematic::*;

/// Wrapper that rounds f64 to 6 decimal places on serialization.
pub(crate) fn serialize_f64_rounded<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_f64(*v, 6))
}

// ─── Document ────────────────────────────────────────────────────────

/// Handle to an entity: its index in [`Document::entities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(pub usize);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Schematic,
    Board,
}

/// A loaded schematic or board. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub metadata: Metadata,
    pub body: Body,
    /// Top-level placed entities in file order, which is also draw order.
    pub entities: Vec<Entity>,
    #[serde(skip)]
    pub ids: HashMap<String, EntityId>,
    /// Top-level lists that are not modelled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Body {
    Schematic(SchematicData),
    Board(BoardData),
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self.body {
            Body::Schematic(_) => DocumentKind::Schematic,
            Body::Board(_) => DocumentKind::Board,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<EntityId> {
        self.ids.get(uuid).copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (EntityId, &Entity)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId(i), e))
    }

    pub fn schematic(&self) -> Option<&SchematicData> {
        match &self.body {
            Body::Schematic(s) => Some(s),
            Body::Board(_) => None,
        }
    }

    pub fn board(&self) -> Option<&BoardData> {
        match &self.body {
            Body::Board(b) => Some(b),
            Body::Schematic(_) => None,
        }
    }

    pub fn lib_symbol(&self, key: &str) -> Option<&LibSymbol> {
        self.schematic()?.lib_symbols.get(key)
    }

    /// Sheet instances in draw order.
    pub fn sheets(&self) -> impl Iterator<Item = (EntityId, &Sheet)> + '_ {
        self.iter().filter_map(|(id, e)| match e {
            Entity::Sheet(s) => Some((id, s)),
            _ => None,
        })
    }

    /// Reference designator of a symbol as seen from one sheet instance path.
    /// Falls back to the legacy `symbol_instances` table, then to the
    /// `Reference` property.
    pub fn reference_for(&self, symbol: &SymbolInstance, sheet_path: &str) -> Option<String> {
        if let Some(r) = symbol.reference_for(sheet_path) {
            return Some(r.to_string());
        }
        if let (Some(sch), Some(uuid)) = (self.schematic(), symbol.uuid.as_deref()) {
            let full = format!("{}/{}", sheet_path.trim_end_matches('/'), uuid);
            if let Some(rec) = sch.symbol_instances.iter().find(|r| r.path == full) {
                return Some(rec.reference.clone());
            }
        }
        symbol.properties.get("Reference").map(|p| p.value.clone())
    }
}

// ─── Metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub version: Option<String>,
    pub generator: Option<String>,
    pub generator_version: Option<String>,
    pub paper: Option<String>,
    pub uuid: Option<String>,
    pub title_block: TitleBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TitleBlock {
    pub title: String,
    pub date: String,
    pub revision: String,
    pub company: String,
    pub comments: Vec<(u32, String)>,
}

// ─── Shared building blocks ──────────────────────────────────────────

/// A named field on a symbol, sheet or footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    /// Display order; absent in newer files.
    pub id: Option<u32>,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    pub visible: bool,
}

pub type PropertyMap = IndexMap<String, Property>;

/// Properties in display order: by `id` when present, then insertion order.
pub fn properties_by_id(props: &PropertyMap) -> Vec<&Property> {
    let mut out: Vec<&Property> = props.values().collect();
    out.sort_by_key(|p| p.id.unwrap_or(u32::MAX));
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stroke {
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    #[default]
    None,
    Outline,
    Background,
    Solid,
    Color,
}

impl Fill {
    pub fn from_keyword(s: &str) -> Self {
        match s {
            "outline" => Fill::Outline,
            "background" => Fill::Background,
            "solid" | "yes" => Fill::Solid,
            "color" => Fill::Color,
            _ => Fill::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effects {
    /// Glyph width (x) and height (y).
    pub font_size: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub justify: Vec<String>,
    pub hidden: bool,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            font_size: Point::new(1.27, 1.27),
            thickness: None,
            bold: false,
            italic: false,
            justify: Vec::new(),
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Line { start: Point, end: Point },
    Rect { start: Point, end: Point },
    Circle {
        center: Point,
        #[serde(serialize_with = "serialize_f64_rounded")]
        radius: f64,
    },
    Arc { start: Point, mid: Point, end: Point },
    Polyline { points: Vec<Point> },
    Polygon { points: Vec<Point> },
    Bezier { points: Vec<Point> },
}

impl Shape {
    /// First defining point, used as the anchor of free graphics.
    pub fn anchor(&self) -> Point {
        match self {
            Shape::Line { start, .. } | Shape::Rect { start, .. } | Shape::Arc { start, .. } => {
                *start
            }
            Shape::Circle { center, .. } => *center,
            Shape::Polyline { points } | Shape::Polygon { points } | Shape::Bezier { points } => {
                points.first().copied().unwrap_or_default()
            }
        }
    }
}

/// Free-standing or owned drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graphic {
    pub shape: Shape,
    pub stroke: Stroke,
    pub fill: Fill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    pub text: String,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    pub effects: Effects,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

// ─── Entities ────────────────────────────────────────────────────────

/// A top-level placed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    Symbol(SymbolInstance),
    Wire(Wire),
    BusEntry(BusEntry),
    Junction(Junction),
    NoConnect(NoConnect),
    Label(Label),
    Text(Text),
    Sheet(Sheet),
    Graphic(Graphic),
    Footprint(Footprint),
    Track(Track),
    Via(Via),
    Zone(Zone),
}

/// Fields common to every placed entity.
pub trait Positioned {
    fn position(&self) -> Point;

    fn rotation(&self) -> f64 {
        0.0
    }

    fn layer(&self) -> Option<&str> {
        None
    }

    fn uuid(&self) -> Option<&str>;

    fn visible(&self) -> bool {
        true
    }
}

impl Positioned for Text {
    fn position(&self) -> Point {
        self.at
    }
    fn rotation(&self) -> f64 {
        self.rotation
    }
    fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
    fn visible(&self) -> bool {
        !self.effects.hidden
    }
}

impl Positioned for Graphic {
    fn position(&self) -> Point {
        self.shape.anchor()
    }
    fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

macro_rules! dispatch_entity {
    ($self:ident, $e:ident => $body:expr) => {
        match $self {
            Entity::Symbol($e) => $body,
            Entity::Wire($e) => $body,
            Entity::BusEntry($e) => $body,
            Entity::Junction($e) => $body,
            Entity::NoConnect($e) => $body,
            Entity::Label($e) => $body,
            Entity::Text($e) => $body,
            Entity::Sheet($e) => $body,
            Entity::Graphic($e) => $body,
            Entity::Footprint($e) => $body,
            Entity::Track($e) => $body,
            Entity::Via($e) => $body,
            Entity::Zone($e) => $body,
        }
    };
}

impl Positioned for Entity {
    fn position(&self) -> Point {
        dispatch_entity!(self, e => e.position())
    }
    fn rotation(&self) -> f64 {
        dispatch_entity!(self, e => e.rotation())
    }
    fn layer(&self) -> Option<&str> {
        dispatch_entity!(self, e => e.layer())
    }
    fn uuid(&self) -> Option<&str> {
        dispatch_entity!(self, e => e.uuid())
    }
    fn visible(&self) -> bool {
        dispatch_entity!(self, e => e.visible())
    }
}

impl Entity {
    /// Short type name for listings and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::Symbol(_) => "symbol",
            Entity::Wire(w) => match w.kind {
                WireKind::Wire => "wire",
                WireKind::Bus => "bus",
            },
            Entity::BusEntry(_) => "bus_entry",
            Entity::Junction(_) => "junction",
            Entity::NoConnect(_) => "no_connect",
            Entity::Label(_) => "label",
            Entity::Text(_) => "text",
            Entity::Sheet(_) => "sheet",
            Entity::Graphic(_) => "graphic",
            Entity::Footprint(_) => "footprint",
            Entity::Track(_) => "track",
            Entity::Via(_) => "via",
            Entity::Zone(_) => "zone",
        }
    }

    /// Properties shown in a detail view, if this kind carries any.
    pub fn properties(&self) -> Option<&PropertyMap> {
        match self {
            Entity::Symbol(s) => Some(&s.properties),
            Entity::Sheet(s) => Some(&s.properties),
            Entity::Footprint(f) => Some(&f.properties),
            _ => None,
        }
    }

    pub fn mirror(&self) -> Option<Mirror> {
        match self {
            Entity::Symbol(s) => s.mirror,
            _ => None,
        }
    }
}
