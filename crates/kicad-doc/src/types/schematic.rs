use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use super::{serialize_f64_rounded, Effects, Fill, Graphic, Positioned, PropertyMap, Stroke, Text};
use crate::geometry::{Mirror, Point};
use crate::sexpr::SExpr;

/// Schematic-only tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchematicData {
    /// Embedded library symbols keyed by `lib_id`.
    pub lib_symbols: IndexMap<String, LibSymbol>,
    /// Legacy root-level `sheet_instances` table.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sheet_instances: Vec<SheetInstanceRecord>,
    /// Legacy root-level `symbol_instances` table.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbol_instances: Vec<SymbolInstanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetInstanceRecord {
    pub path: String,
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInstanceRecord {
    pub path: String,
    pub reference: String,
    pub unit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footprint: Option<String>,
}

// ─── Library symbols ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibSymbol {
    pub lib_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    pub power: bool,
    pub pin_numbers_hidden: bool,
    pub pin_names_hidden: bool,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub pin_name_offset: f64,
    pub in_bom: bool,
    pub on_board: bool,
    pub properties: PropertyMap,
    /// Drawable units. Unit 0 holds items shared by every unit.
    pub units: Vec<SymbolUnit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

impl LibSymbol {
    pub fn new(lib_id: impl Into<String>) -> Self {
        Self {
            lib_id: lib_id.into(),
            extends: None,
            power: false,
            pin_numbers_hidden: false,
            pin_names_hidden: false,
            pin_name_offset: 0.508,
            in_bom: true,
            on_board: true,
            properties: PropertyMap::new(),
            units: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Units drawn for a placed `unit`/`style`: the shared unit 0 plus the
    /// matching numbered unit. Style 0 matches every body style.
    pub fn units_for(&self, unit: u32, style: u32) -> impl Iterator<Item = &SymbolUnit> + '_ {
        self.units.iter().filter(move |u| {
            (u.unit == 0 || u.unit == unit) && (u.style == 0 || u.style == style)
        })
    }

    /// Every pin of the symbol, across units.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> + '_ {
        self.units.iter().flat_map(|u| u.pins.iter())
    }

    pub fn unit_count(&self) -> u32 {
        self.units.iter().map(|u| u.unit).max().unwrap_or(0).max(1)
    }
}

/// One `Name_U_S` sub-symbol: unit `U`, body style `S`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolUnit {
    pub name: String,
    pub unit: u32,
    pub style: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    pub graphics: Vec<Graphic>,
    pub texts: Vec<Text>,
    pub pins: Vec<Pin>,
}

impl SymbolUnit {
    pub fn new(name: impl Into<String>, unit: u32, style: u32) -> Self {
        Self {
            name: name.into(),
            unit,
            style,
            unit_name: None,
            graphics: Vec::new(),
            texts: Vec::new(),
            pins: Vec::new(),
        }
    }
}

pub const DEFAULT_PIN_LENGTH: f64 = 2.54;

/// Library pin. Coordinates are in library space (y up).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub electrical: PinElectrical,
    pub graphic_style: String,
    pub at: Point,
    /// Direction from the connection point towards the body, in degrees.
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub length: f64,
    pub name: String,
    pub number: String,
    pub hidden: bool,
}

impl Default for Pin {
    fn default() -> Self {
        Self {
            electrical: PinElectrical::Unspecified,
            graphic_style: "line".to_string(),
            at: Point::ORIGIN,
            rotation: 0.0,
            length: DEFAULT_PIN_LENGTH,
            name: String::new(),
            number: String::new(),
            hidden: false,
        }
    }
}

impl Pin {
    /// Far end of the pin line, in library space.
    pub fn tip(&self) -> Point {
        let a = crate::geometry::deg2rad(self.rotation);
        Point::new(
            self.at.x + self.length * a.cos(),
            self.at.y + self.length * a.sin(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinElectrical {
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
    Free,
    Unspecified,
    PowerIn,
    PowerOut,
    OpenCollector,
    OpenEmitter,
    NoConnect,
}

impl FromStr for PinElectrical {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "input" => PinElectrical::Input,
            "output" => PinElectrical::Output,
            "bidirectional" => PinElectrical::Bidirectional,
            "tri_state" => PinElectrical::TriState,
            "passive" => PinElectrical::Passive,
            "free" => PinElectrical::Free,
            "unspecified" => PinElectrical::Unspecified,
            "power_in" => PinElectrical::PowerIn,
            "power_out" => PinElectrical::PowerOut,
            "open_collector" => PinElectrical::OpenCollector,
            "open_emitter" => PinElectrical::OpenEmitter,
            "no_connect" => PinElectrical::NoConnect,
            other => return Err(format!("unknown pin electrical type `{other}`")),
        })
    }
}

// ─── Placed schematic entities ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInstance {
    pub lib_id: String,
    /// Key into the embedded library when it differs from `lib_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_name: Option<String>,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<Mirror>,
    pub unit: u32,
    /// Body style (`convert` in older files).
    pub style: u32,
    pub in_bom: bool,
    pub on_board: bool,
    pub dnp: bool,
    pub uuid: Option<String>,
    pub properties: PropertyMap,
    /// Pin number to pin uuid.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<(String, Option<String>)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<SymbolInstancePath>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

/// `(instances (project P (path "/a/b" (reference R) (unit U))))` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInstancePath {
    pub project: String,
    pub path: String,
    pub reference: String,
    pub unit: u32,
}

impl SymbolInstance {
    /// Name of the embedded library symbol this instance draws.
    pub fn lib_key(&self) -> &str {
        self.lib_name.as_deref().unwrap_or(&self.lib_id)
    }

    /// Reference designator declared for a sheet instance path.
    pub fn reference_for(&self, sheet_path: &str) -> Option<&str> {
        let want = sheet_path.trim_end_matches('/');
        self.instances
            .iter()
            .find(|i| i.path.trim_end_matches('/') == want)
            .map(|i| i.reference.as_str())
    }

    pub fn reference(&self) -> Option<&str> {
        self.properties.get("Reference").map(|p| p.value.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.properties.get("Value").map(|p| p.value.as_str())
    }
}

impl Positioned for SymbolInstance {
    fn position(&self) -> Point {
        self.at
    }
    fn rotation(&self) -> f64 {
        self.rotation
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Wire,
    Bus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wire {
    pub kind: WireKind,
    pub points: Vec<Point>,
    pub stroke: Stroke,
    pub uuid: Option<String>,
}

impl Positioned for Wire {
    fn position(&self) -> Point {
        self.points.first().copied().unwrap_or_default()
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEntry {
    pub at: Point,
    pub size: Point,
    pub stroke: Stroke,
    pub uuid: Option<String>,
}

impl Positioned for BusEntry {
    fn position(&self) -> Point {
        self.at
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Junction {
    pub at: Point,
    /// Zero means the renderer default.
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub diameter: f64,
    pub uuid: Option<String>,
}

impl Positioned for Junction {
    fn position(&self) -> Point {
        self.at
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoConnect {
    pub at: Point,
    pub uuid: Option<String>,
}

impl Positioned for NoConnect {
    fn position(&self) -> Point {
        self.at
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Local,
    Global,
    Hierarchical,
    /// `netclass_flag` directive label.
    Directive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub kind: LabelKind,
    pub text: String,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    /// Flag outline for global, hierarchical and directive labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    /// Stem length of directive labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    pub effects: Effects,
    pub properties: PropertyMap,
    pub uuid: Option<String>,
}

impl Positioned for Label {
    fn position(&self) -> Point {
        self.at
    }
    fn rotation(&self) -> f64 {
        self.rotation
    }
    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
    fn visible(&self) -> bool {
        !self.effects.hidden
    }
}

// ─── Sheets ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub at: Point,
    pub size: Point,
    pub uuid: String,
    pub name: String,
    pub file: String,
    pub stroke: Stroke,
    pub fill: Fill,
    pub properties: PropertyMap,
    pub pins: Vec<SheetPin>,
    /// Instance paths declared in the file, with their page numbers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<SheetInstancePath>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<SExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPin {
    pub name: String,
    pub shape: String,
    pub at: Point,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub rotation: f64,
    pub effects: Effects,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetInstancePath {
    pub project: String,
    pub path: String,
    pub page: Option<String>,
}

impl Positioned for Sheet {
    fn position(&self) -> Point {
        self.at
    }
    fn uuid(&self) -> Option<&str> {
        Some(&self.uuid)
    }
}
