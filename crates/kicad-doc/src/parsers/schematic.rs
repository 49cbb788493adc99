use log::debug;

use super::common::{self, effects_of, properties, stroke};
use super::fields::{opt_number_at, xy, Fields};
use super::{dispatch, Builder, Diagnostics, EntityBinder, Rule};
use crate::error::{ReferenceKind, SchemaError};
use crate::geometry::{normalize_angle, Mirror, Point};
use crate::sexpr::SExpr;
use crate::types::*;

const METADATA: &[Rule<Builder<SchematicData>>] = &[
    ("version", super::version),
    ("generator", super::generator),
    ("generator_version", super::generator_version),
    ("uuid", super::uuid),
    ("paper", super::paper),
    ("title_block", super::title_block),
    ("lib_symbols", lib_symbols),
    ("sheet_instances", sheet_instances),
    ("symbol_instances", symbol_instances),
];

const ENTITIES: &[(&str, EntityBinder)] = &[
    ("symbol", symbol),
    ("wire", wire),
    ("bus", wire),
    ("bus_entry", bus_entry),
    ("junction", junction),
    ("no_connect", no_connect),
    ("label", label),
    ("global_label", label),
    ("hierarchical_label", label),
    ("netclass_flag", label),
    ("text", text),
    ("text_box", text),
    ("polyline", graphic),
    ("rectangle", graphic),
    ("circle", graphic),
    ("arc", graphic),
    ("bezier", graphic),
    ("sheet", sheet),
];

pub(crate) fn bind(root: &SExpr) -> (Document, Diagnostics) {
    let mut b = Builder::<SchematicData>::new();
    b.walk(root, METADATA, ENTITIES);
    check_references(&mut b);
    b.finish(Body::Schematic)
}

fn check_references(b: &mut Builder<SchematicData>) {
    let mut missing = Vec::new();
    for (i, entity) in b.entities.iter().enumerate() {
        if let Entity::Symbol(s) = entity {
            if !b.body.lib_symbols.contains_key(s.lib_key()) {
                missing.push((s.lib_key().to_string(), EntityId(i)));
            }
        }
    }
    for (lib_id, id) in missing {
        b.dangling(ReferenceKind::LibSymbol, lib_id, Some(id));
    }

    let mut bad_parents = Vec::new();
    for sym in b.body.lib_symbols.values() {
        if let Some(parent) = &sym.extends {
            let prefix = sym.lib_id.split_once(':').map(|(lib, _)| lib);
            let qualified = prefix.map(|lib| format!("{lib}:{parent}"));
            let found = b.body.lib_symbols.contains_key(parent.as_str())
                || qualified.is_some_and(|q| b.body.lib_symbols.contains_key(&q));
            if !found {
                bad_parents.push(parent.clone());
            }
        }
    }
    for parent in bad_parents {
        b.dangling(ReferenceKind::LibSymbol, parent, None);
    }
}

// ─── Library symbols ─────────────────────────────────────────────────

fn lib_symbols(
    b: &mut Builder<SchematicData>,
    node: &SExpr,
    diags: &mut Diagnostics,
) -> Result<(), SchemaError> {
    for child in node.children() {
        if child.tag() != Some("symbol") {
            continue;
        }
        match lib_symbol(child, diags) {
            Ok(sym) => {
                debug!("library symbol {}", sym.lib_id);
                b.body.lib_symbols.insert(sym.lib_id.clone(), sym);
            }
            Err(err) => {
                log::warn!("dropping library symbol: {err}");
                diags.push(crate::error::Diagnostic::Schema(err.within("symbol")));
            }
        }
    }
    Ok(())
}

const LIB_SYMBOL_RULES: &[Rule<LibSymbol>] = &[
    ("property", lib_property),
    ("symbol", lib_unit),
    ("pin", shared_pin),
    ("rectangle", shared_graphic),
    ("circle", shared_graphic),
    ("arc", shared_graphic),
    ("polyline", shared_graphic),
    ("bezier", shared_graphic),
    ("text", shared_text),
];

const UNIT_RULES: &[Rule<SymbolUnit>] = &[
    ("pin", unit_pin),
    ("rectangle", unit_graphic),
    ("circle", unit_graphic),
    ("arc", unit_graphic),
    ("polyline", unit_graphic),
    ("bezier", unit_graphic),
    ("text", unit_text),
    ("unit_name", unit_name),
];

fn lib_symbol(node: &SExpr, diags: &mut Diagnostics) -> Result<LibSymbol, SchemaError> {
    let f = Fields::new("symbol", node);
    let mut sym = LibSymbol::new(f.text(0, "library id")?);
    sym.extends = f.kw_text("extends")?;
    sym.power = f.flag("power");
    sym.in_bom = f.flag_or("in_bom", true);
    sym.on_board = f.flag_or("on_board", true);
    if let Some(pn) = f.get("pin_numbers") {
        sym.pin_numbers_hidden = Fields::new("pin_numbers", pn).flag("hide");
    }
    if let Some(pn) = f.get("pin_names") {
        let pn = Fields::new("pin_names", pn);
        sym.pin_names_hidden = pn.flag("hide");
        if let Some(offset) = pn.kw_number("offset")? {
            sym.pin_name_offset = offset;
        }
    }
    let extra = dispatch(&mut sym, f.rest(), LIB_SYMBOL_RULES, diags);
    sym.extra = extra;
    Ok(sym)
}

fn lib_property(sym: &mut LibSymbol, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let p = common::property(node)?;
    sym.properties.insert(p.name.clone(), p);
    Ok(())
}

/// `Name_U_S` suffix: unit and body style.
fn unit_numbers(name: &str) -> (u32, u32) {
    let mut parts = name.rsplitn(3, '_');
    let style = parts.next().and_then(|s| s.parse().ok());
    let unit = parts.next().and_then(|s| s.parse().ok());
    match (unit, style) {
        (Some(u), Some(s)) => (u, s),
        _ => (0, 0),
    }
}

fn lib_unit(sym: &mut LibSymbol, node: &SExpr, diags: &mut Diagnostics) -> Result<(), SchemaError> {
    let f = Fields::new("symbol", node);
    let name = f.text(0, "unit name")?;
    let (unit, style) = unit_numbers(&name);
    let mut u = SymbolUnit::new(name, unit, style);
    let extra = dispatch(&mut u, node.children(), UNIT_RULES, diags);
    if !extra.is_empty() {
        debug!("unit {} keeps {} unknown lists", u.name, extra.len());
        sym.extra.extend(extra);
    }
    sym.units.push(u);
    Ok(())
}

/// Unit holding items placed directly in the symbol, shared by every unit.
fn shared_unit(sym: &mut LibSymbol) -> &mut SymbolUnit {
    let idx = match sym.units.iter().position(|u| u.unit == 0 && u.style == 0) {
        Some(i) => i,
        None => {
            let name = format!("{}_0_0", sym.lib_id);
            sym.units.push(SymbolUnit::new(name, 0, 0));
            sym.units.len() - 1
        }
    };
    &mut sym.units[idx]
}

fn shared_pin(sym: &mut LibSymbol, node: &SExpr, diags: &mut Diagnostics) -> Result<(), SchemaError> {
    unit_pin(shared_unit(sym), node, diags)
}

fn shared_graphic(sym: &mut LibSymbol, node: &SExpr, diags: &mut Diagnostics) -> Result<(), SchemaError> {
    unit_graphic(shared_unit(sym), node, diags)
}

fn shared_text(sym: &mut LibSymbol, node: &SExpr, diags: &mut Diagnostics) -> Result<(), SchemaError> {
    unit_text(shared_unit(sym), node, diags)
}

fn unit_pin(u: &mut SymbolUnit, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    u.pins.push(bind_pin(node)?);
    Ok(())
}

fn unit_graphic(u: &mut SymbolUnit, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let head = node.tag().unwrap_or_default();
    u.graphics.push(common::graphic(head, node)?);
    Ok(())
}

fn unit_text(u: &mut SymbolUnit, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    u.texts.push(common::text("text", node, 0)?);
    Ok(())
}

fn unit_name(u: &mut SymbolUnit, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    u.unit_name = node.text_at(0).map(|t| t.into_owned());
    Ok(())
}

/// Bind a library pin.
///
/// Two layouts are accepted: `(pin "1" (at ...) (length ...))`, where the
/// leading string is the pin name, and KiCad's
/// `(pin <electrical> <style> (at ...) (length ...) (name ...) (number ...))`.
/// Omitted fields default to position (0, 0), rotation 0 and length 2.54.
pub fn bind_pin(node: &SExpr) -> Result<Pin, SchemaError> {
    let f = Fields::new("pin", node);
    let mut pin = Pin::default();

    match f.positional().first() {
        Some(SExpr::String(name)) => pin.name = name.clone(),
        _ => {
            if let Some(kind) = f.opt_text(0) {
                pin.electrical = kind.parse().unwrap_or_else(|e| {
                    debug!("{e}; treating as unspecified");
                    PinElectrical::Unspecified
                });
            }
            if let Some(style) = f.opt_text(1) {
                pin.graphic_style = style;
            }
        }
    }

    if let Some((at, rotation)) = f.at()? {
        pin.at = at;
        pin.rotation = normalize_angle(rotation);
    }
    if let Some(length) = f.kw_number("length")? {
        pin.length = length;
    }
    if let Some(name) = f.kw_text("name")? {
        pin.name = name;
    }
    if let Some(number) = f.kw_text("number")? {
        pin.number = number;
    }
    pin.hidden = f.flag("hide");
    Ok(pin)
}

// ─── Legacy instance tables ──────────────────────────────────────────

fn sheet_instances(
    b: &mut Builder<SchematicData>,
    node: &SExpr,
    _: &mut Diagnostics,
) -> Result<(), SchemaError> {
    for path in node.find_all("path") {
        let f = Fields::new("path", path);
        b.body.sheet_instances.push(SheetInstanceRecord {
            path: f.text(0, "instance path")?,
            page: f.kw_text("page")?,
        });
    }
    Ok(())
}

fn symbol_instances(
    b: &mut Builder<SchematicData>,
    node: &SExpr,
    _: &mut Diagnostics,
) -> Result<(), SchemaError> {
    for path in node.find_all("path") {
        let f = Fields::new("path", path);
        b.body.symbol_instances.push(SymbolInstanceRecord {
            path: f.text(0, "instance path")?,
            reference: f.kw_text("reference")?.unwrap_or_default(),
            unit: f.kw_number("unit")?.map_or(1, |u| u as u32),
            value: f.kw_text("value")?,
            footprint: f.kw_text("footprint")?,
        });
    }
    Ok(())
}

// ─── Placed entities ─────────────────────────────────────────────────

fn required_at(f: &Fields) -> Result<(Point, f64), SchemaError> {
    f.at()?.ok_or_else(|| f.error("missing (at x y)"))
}

fn symbol(head: &str, node: &SExpr, diags: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let lib_id = f
        .kw_text("lib_id")?
        .ok_or_else(|| f.error("missing (lib_id ...)"))?;
    let (at, rotation) = f.at()?.unwrap_or_default();
    let mirror = match f.kw_text("mirror")?.as_deref() {
        Some("x") => Some(Mirror::X),
        Some("y") => Some(Mirror::Y),
        Some(other) => return Err(f.error(format!("unknown mirror axis `{other}`"))),
        None => None,
    };
    let style = match f.kw_number("body_style")? {
        Some(s) => Some(s),
        None => f.kw_number("convert")?,
    };

    let pins = f
        .all("pin")
        .into_iter()
        .filter_map(|p| {
            let number = p.text_at(0)?.into_owned();
            let uuid = p.value("uuid").map(|u| u.into_owned());
            Some((number, uuid))
        })
        .collect();

    let mut instances = Vec::new();
    if let Some(inst) = f.get("instances") {
        for project in inst.find_all("project") {
            let project_name = project.text_at(0).map(|t| t.into_owned()).unwrap_or_default();
            for path in project.find_all("path") {
                let p = Fields::new("path", path);
                instances.push(SymbolInstancePath {
                    project: project_name.clone(),
                    path: p.text(0, "instance path")?,
                    reference: p.kw_text("reference")?.unwrap_or_default(),
                    unit: p.kw_number("unit")?.map_or(1, |u| u as u32),
                });
            }
        }
    }

    Ok(Entity::Symbol(SymbolInstance {
        lib_id,
        lib_name: f.kw_text("lib_name")?,
        at,
        rotation: normalize_angle(rotation),
        mirror,
        unit: f.kw_number("unit")?.map_or(1, |u| u as u32),
        style: style.map_or(1, |s| s as u32),
        in_bom: f.flag_or("in_bom", true),
        on_board: f.flag_or("on_board", true),
        dnp: f.flag("dnp"),
        uuid: f.uuid(),
        properties: properties(&f, diags),
        pins,
        instances,
        // Read last: everything above marks its lists as used.
        extra: f.extra(),
    }))
}

fn wire(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let points = match f.get("pts") {
        Some(pts) => common::pts(pts)?,
        None => return Err(f.error("missing (pts ...)")),
    };
    if points.is_empty() {
        return Err(f.error("wire has no points"));
    }
    Ok(Entity::Wire(Wire {
        kind: if head == "bus" { WireKind::Bus } else { WireKind::Wire },
        points,
        stroke: stroke(&f)?,
        uuid: f.uuid(),
    }))
}

fn bus_entry(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let (at, _) = required_at(&f)?;
    Ok(Entity::BusEntry(BusEntry {
        at,
        size: f.kw_xy("size")?.unwrap_or(Point::new(2.54, 2.54)),
        stroke: stroke(&f)?,
        uuid: f.uuid(),
    }))
}

fn junction(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let (at, _) = required_at(&f)?;
    Ok(Entity::Junction(Junction {
        at,
        diameter: f.kw_number("diameter")?.unwrap_or(0.0),
        uuid: f.uuid(),
    }))
}

fn no_connect(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let (at, _) = required_at(&f)?;
    Ok(Entity::NoConnect(NoConnect { at, uuid: f.uuid() }))
}

fn label(head: &str, node: &SExpr, diags: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let kind = match head {
        "global_label" => LabelKind::Global,
        "hierarchical_label" => LabelKind::Hierarchical,
        "netclass_flag" => LabelKind::Directive,
        _ => LabelKind::Local,
    };
    let text = f.text(0, "label text")?;
    let (at, rotation) = required_at(&f)?;
    Ok(Entity::Label(Label {
        kind,
        text,
        at,
        rotation: normalize_angle(rotation),
        shape: f.kw_text("shape")?,
        length: f.kw_number("length")?,
        effects: effects_of(&f)?,
        properties: properties(&f, diags),
        uuid: f.uuid(),
    }))
}

fn text(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    Ok(Entity::Text(common::text(head, node, 0)?))
}

fn graphic(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    Ok(Entity::Graphic(common::graphic(head, node)?))
}

fn sheet(head: &str, node: &SExpr, diags: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let (at, _) = required_at(&f)?;
    let size = f.kw_xy("size")?.ok_or_else(|| f.error("missing (size w h)"))?;
    let uuid = f.uuid().ok_or_else(|| f.error("missing (uuid ...)"))?;
    let props = properties(&f, diags);
    let prop = |names: [&str; 2]| {
        names
            .iter()
            .find_map(|n| props.get(*n))
            .map(|p| p.value.clone())
    };
    let file = prop(["Sheetfile", "Sheet file"]).ok_or_else(|| f.error("missing Sheetfile property"))?;
    let name = prop(["Sheetname", "Sheet name"]).unwrap_or_default();

    let mut pins = Vec::new();
    for pin in f.all("pin") {
        match sheet_pin(pin) {
            Ok(p) => pins.push(p),
            Err(err) => {
                log::warn!("dropping sheet pin: {err}");
                diags.push(crate::error::Diagnostic::Schema(err.within("pin")));
            }
        }
    }

    let mut instances = Vec::new();
    if let Some(inst) = f.get("instances") {
        for project in inst.find_all("project") {
            let project_name = project.text_at(0).map(|t| t.into_owned()).unwrap_or_default();
            for path in project.find_all("path") {
                let p = Fields::new("path", path);
                instances.push(SheetInstancePath {
                    project: project_name.clone(),
                    path: p.text(0, "instance path")?,
                    page: p.kw_text("page")?,
                });
            }
        }
    }

    Ok(Entity::Sheet(Sheet {
        at,
        size,
        uuid,
        name,
        file,
        stroke: stroke(&f)?,
        fill: common::fill(&f),
        properties: props,
        pins,
        instances,
        extra: f.extra(),
    }))
}

/// `(pin "NAME" <shape> (at x y r) (effects ...) (uuid ...))` on a sheet.
fn sheet_pin(node: &SExpr) -> Result<SheetPin, SchemaError> {
    let f = Fields::new("pin", node);
    let at = f.get("at").ok_or_else(|| f.error("missing (at x y)"))?;
    Ok(SheetPin {
        name: f.text(0, "pin name")?,
        shape: f.opt_text(1).unwrap_or_else(|| "passive".to_string()),
        at: xy("at", at)?,
        rotation: opt_number_at("at", at, 2, "angle")?.unwrap_or(0.0),
        effects: effects_of(&f)?,
        uuid: f.uuid(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostic;
    use crate::sexpr::parse;

    fn load(text: &str) -> (Document, Diagnostics) {
        bind(&parse(text).unwrap())
    }

    #[test]
    fn test_compact_pin() {
        let pin = bind_pin(&parse("(pin \"1\" (at 0 0 0) (length 2.54))").unwrap()).unwrap();
        assert_eq!(pin.name, "1");
        assert_eq!(pin.at, Point::ORIGIN);
        assert_eq!(pin.rotation, 0.0);
        assert_eq!(pin.length, 2.54);
    }

    #[test]
    fn test_pin_defaults() {
        let pin = bind_pin(&parse("(pin \"1\")").unwrap()).unwrap();
        assert_eq!(pin.length, DEFAULT_PIN_LENGTH);
        assert_eq!(pin.at, Point::ORIGIN);
        assert_eq!(pin.rotation, 0.0);
        assert!(!pin.hidden);
    }

    #[test]
    fn test_library_pin() {
        let pin = bind_pin(
            &parse(
                "(pin power_in line (at 0 3.81 270) (length 1.27) hide \
                 (name \"VCC\" (effects (font (size 1.27 1.27)))) \
                 (number \"8\" (effects (font (size 1.27 1.27)))))",
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(pin.electrical, PinElectrical::PowerIn);
        assert_eq!(pin.graphic_style, "line");
        assert_eq!(pin.at, Point::new(0.0, 3.81));
        assert_eq!(pin.rotation, 270.0);
        assert_eq!(pin.length, 1.27);
        assert_eq!(pin.name, "VCC");
        assert_eq!(pin.number, "8");
        assert!(pin.hidden);
    }

    #[test]
    fn test_bad_pin_is_dropped_alone() {
        let (doc, diags) = load(
            "(kicad_sch (lib_symbols (symbol \"Device:R\" \
               (symbol \"R_1_1\" (pin \"1\" (at \"x\" 0 0)) (pin \"2\" (at 0 0 0))))) \
             (wire (pts (xy 0 0) (xy 10 0))))",
        );
        assert_eq!(diags.len(), 1);
        let Diagnostic::Schema(err) = &diags[0] else {
            panic!("expected schema error, got {:?}", diags[0]);
        };
        assert_eq!(err.head, "at");
        assert_eq!(err.entity.as_deref(), Some("pin"));

        let sym = doc.lib_symbol("Device:R").unwrap();
        assert_eq!(sym.pins().count(), 1);
        assert_eq!(doc.entities.len(), 1);
    }

    #[test]
    fn test_bad_entity_is_dropped_and_rest_loads() {
        let (doc, diags) = load(
            "(kicad_sch (junction (at 1 2) (uuid j1)) (junction (uuid j2)) (no_connect (at 3 4) (uuid n1)))",
        );
        assert_eq!(doc.entities.len(), 2);
        assert_eq!(diags.len(), 1);
        assert!(doc.by_uuid("n1").is_some());
        assert!(doc.by_uuid("j2").is_none());
    }

    #[test]
    fn test_unit_numbers() {
        assert_eq!(unit_numbers("Device:R_0_1"), (0, 1));
        assert_eq!(unit_numbers("LM358_2_1"), (2, 1));
        assert_eq!(unit_numbers("weird"), (0, 0));
    }

    #[test]
    fn test_symbol_defaults_and_dangling_lib() {
        let (doc, diags) = load(
            "(kicad_sch (symbol (lib_id \"Device:C\") (at 10 20 90) (uuid s1) \
               (property \"Reference\" \"C1\" (at 0 0 0))))",
        );
        let Entity::Symbol(sym) = &doc.entities[0] else {
            panic!("expected symbol");
        };
        assert_eq!(sym.unit, 1);
        assert!(sym.in_bom);
        assert!(!sym.dnp);
        assert_eq!(sym.rotation, 90.0);
        assert_eq!(sym.reference(), Some("C1"));
        assert!(matches!(
            &diags[..],
            [Diagnostic::Dangling(d)] if d.kind == ReferenceKind::LibSymbol && d.entity == Some(EntityId(0))
        ));
    }

    #[test]
    fn test_labels() {
        let (doc, diags) = load(
            "(kicad_sch (global_label \"CLK\" (shape input) (at 5 5 180) (effects (font (size 1.27 1.27))) (uuid g1)) \
             (netclass_flag \"\" (length 2.54) (shape round) (at 1 1 0) (uuid d1) \
               (property \"Netclass\" \"HS\" (at 1 1 0))))",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Entity::Label(g) = &doc.entities[0] else {
            panic!()
        };
        assert_eq!(g.kind, LabelKind::Global);
        assert_eq!(g.shape.as_deref(), Some("input"));
        let Entity::Label(d) = &doc.entities[1] else {
            panic!()
        };
        assert_eq!(d.kind, LabelKind::Directive);
        assert_eq!(d.length, Some(2.54));
        assert_eq!(d.properties["Netclass"].value, "HS");
    }

    #[test]
    fn test_sheet() {
        let (doc, diags) = load(
            "(kicad_sch (uuid root) (sheet (at 10 10) (size 20 15) (uuid s1) \
               (property \"Sheetname\" \"Power\" (at 10 9 0)) \
               (property \"Sheetfile\" \"power.kicad_sch\" (at 10 26 0)) \
               (pin \"VIN\" input (at 10 12 180) (uuid p1)) \
               (instances (project \"demo\" (path \"/root\" (page \"2\"))))))",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let (_, sheet) = doc.sheets().next().unwrap();
        assert_eq!(sheet.file, "power.kicad_sch");
        assert_eq!(sheet.name, "Power");
        assert_eq!(sheet.pins[0].shape, "input");
        assert_eq!(sheet.instances[0].page.as_deref(), Some("2"));
        assert_eq!(doc.metadata.uuid.as_deref(), Some("root"));
    }

    #[test]
    fn test_ill_typed_angles_raise_schema_errors() {
        assert!(bind_pin(&parse("(pin passive line (at 1 2 \"x\") (length 2.54))").unwrap()).is_err());

        let (doc, diags) = load("(kicad_sch (version 1) (junction (at 1 2 \"x\") (uuid \"j1\")))");
        assert!(doc.entities.is_empty());
        assert!(matches!(&diags[..], [Diagnostic::Schema(e)] if e.head == "at"));

        let (doc, diags) = load(
            "(kicad_sch (sheet (at 0 0) (size 10 10) (uuid s1) \
               (property \"Sheetfile\" \"a.kicad_sch\") \
               (pin \"A\" input (at 0 1 \"x\")) (pin \"B\" output (at 0 2 0))))",
        );
        let (_, sheet) = doc.sheets().next().unwrap();
        assert_eq!(sheet.pins.len(), 1);
        assert_eq!(sheet.pins[0].name, "B");
        assert!(matches!(&diags[..], [Diagnostic::Schema(e)] if e.head == "at"));
    }

    #[test]
    fn test_sheet_keeps_fields_autoplaced() {
        let (doc, _) = load(
            "(kicad_sch (sheet (at 0 0) (size 10 10) (fields_autoplaced) (uuid s1) \
               (property \"Sheetfile\" \"a.kicad_sch\")))",
        );
        let (_, sheet) = doc.sheets().next().unwrap();
        assert!(sheet.extra.iter().any(|e| e.tag() == Some("fields_autoplaced")));
    }

    #[test]
    fn test_sheet_requires_file() {
        let (doc, diags) = load("(kicad_sch (sheet (at 0 0) (size 1 1) (uuid s1)))");
        assert!(doc.entities.is_empty());
        assert!(matches!(&diags[0], Diagnostic::Schema(e) if e.reason.contains("Sheetfile")));
    }

    #[test]
    fn test_unknown_heads_pass_through() {
        let (doc, diags) = load("(kicad_sch (image (at 0 0) (data \"abc\")) (bus_alias \"x\" (members a b)))");
        assert!(diags.is_empty());
        assert!(doc.entities.is_empty());
        assert_eq!(doc.extra.len(), 2);
    }

    #[test]
    fn test_duplicate_uuid_reported() {
        let (doc, diags) = load("(kicad_sch (junction (at 0 0) (uuid same)) (junction (at 1 1) (uuid same)))");
        assert_eq!(doc.entities.len(), 2);
        assert_eq!(doc.by_uuid("same"), Some(EntityId(0)));
        assert!(matches!(
            &diags[..],
            [Diagnostic::Dangling(d)] if d.kind == ReferenceKind::DuplicateId
        ));
    }

    #[test]
    fn test_symbol_instances_and_reference_for() {
        let (doc, _) = load(
            "(kicad_sch (lib_symbols (symbol \"Device:R\")) \
             (symbol (lib_id \"Device:R\") (at 0 0 0) (uuid r1) \
               (property \"Reference\" \"R?\" (at 0 0 0)) \
               (instances (project \"p\" (path \"/root/s1\" (reference \"R7\") (unit 1))))) \
             (symbol_instances (path \"/root/r1\" (reference \"R1\") (unit 1))))",
        );
        let Entity::Symbol(sym) = &doc.entities[0] else {
            panic!()
        };
        assert_eq!(doc.reference_for(sym, "/root/s1").as_deref(), Some("R7"));
        assert_eq!(doc.reference_for(sym, "/root").as_deref(), Some("R1"));
        assert_eq!(doc.reference_for(sym, "/other").as_deref(), Some("R?"));
    }
}
