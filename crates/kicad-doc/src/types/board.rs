use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;

use super::{serialize_f64_rounded, Graphic, Positioned, PropertyMap, Text};
use crate::geometry::Point;
use crate::sexpr::SExpr;

/// Board-only tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardData {
    /// Net number to net name.
    pub nets: BTreeMap<u32, String>,
    pub layers: Vec<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
}

impl BoardData {
    pub fn net_name(&self, number: u32) -> Option<&str> {
        self.nets.get(&number).map(String::as_str)
    }

    pub fn has_net_named(&self, name: &str) -> bool {
        self.nets.values().any(|n| n == name)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub ordinal: u32,
    pub name: String,
    /// `signal`, `power`, `mixed`, `jumper` or `user`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

// ─── Footprint ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    pub lib_id: String,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    pub layer: String,
    pub uuid: Option<String>,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    pub properties: PropertyMap,
    pub pads: Vec<Pad>,
    /// Outline and silkscreen primitives in footprint-local coordinates.
    pub graphics: Vec<Graphic>,
    pub texts: Vec<Text>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

impl Footprint {
    pub fn new(lib_id: impl Into<String>) -> Self {
        Self {
            lib_id: lib_id.into(),
            at: Point::ORIGIN,
            rotation: 0.0,
            layer: "F.Cu".to_string(),
            uuid: None,
            locked: false,
            attr: None,
            properties: PropertyMap::new(),
            pads: Vec::new(),
            graphics: Vec::new(),
            texts: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        self.properties.get("Reference").map(|p| p.value.as_str())
    }
}

impl Positioned for Footprint {
    fn position(&self) -> Point {
        self.at
    }
    fn rotation(&self) -> f64 {
        self.rotation
    }
    fn layer(&self) -> Option<&str> {
        Some(&self.layer)
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PadKind {
    Smd,
    ThruHole,
    NpThruHole,
    Connect,
}

impl PadKind {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "smd" => Some(PadKind::Smd),
            "thru_hole" => Some(PadKind::ThruHole),
            "np_thru_hole" => Some(PadKind::NpThruHole),
            "connect" => Some(PadKind::Connect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pad {
    pub number: String,
    pub kind: PadKind,
    pub shape: String,
    /// Position relative to the footprint origin, before footprint rotation.
    pub at: Point,
    /// Absolute pad angle in degrees (already includes footprint rotation).
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    pub size: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drill: Option<Drill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net: Option<PadNet>,
    pub layers: Vec<String>,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drill {
    pub oval: bool,
    pub size: Point,
    pub offset: Point,
}

/// Net reference on a pad. Older files give number and name, newer ones
/// may give only the name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PadNet {
    pub number: Option<u32>,
    pub name: Option<String>,
}

// ─── Tracks, vias, zones ─────────────────────────────────────────────

pub const DEFAULT_TRACK_WIDTH: f64 = 0.25;
pub const DEFAULT_VIA_SIZE: f64 = 0.6;
pub const DEFAULT_VIA_DRILL: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum TrackShape {
    Line,
    Arc { mid: Point },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub shape: TrackShape,
    pub start: Point,
    pub end: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub width: f64,
    pub layer: String,
    pub net: Option<u32>,
    pub uuid: Option<String>,
}

impl Positioned for Track {
    fn position(&self) -> Point {
        self.start
    }
    fn layer(&self) -> Option<&str> {
        Some(&self.layer)
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Via {
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub size: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub drill: f64,
    pub layers: Vec<String>,
    pub net: Option<u32>,
    pub uuid: Option<String>,
}

impl Positioned for Via {
    fn position(&self) -> Point {
        self.at
    }
    fn layer(&self) -> Option<&str> {
        self.layers.first().map(String::as_str)
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub net: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub layers: Vec<String>,
    pub outline: Vec<Point>,
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

impl Positioned for Zone {
    fn position(&self) -> Point {
        self.outline.first().copied().unwrap_or_default()
    }
    fn layer(&self) -> Option<&str> {
        self.layers.first().map(String::as_str)
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}
