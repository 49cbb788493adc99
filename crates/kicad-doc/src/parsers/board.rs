use log::debug;

use super::common::{self, layers};
use super::fields::{number_at, Fields};
use super::{dispatch, Builder, Diagnostics, EntityBinder, Rule};
use crate::error::{ReferenceKind, SchemaError};
use crate::geometry::{normalize_angle, Point};
use crate::sexpr::SExpr;
use crate::types::*;

const METADATA: &[Rule<Builder<BoardData>>] = &[
    ("version", super::version),
    ("generator", super::generator),
    ("generator_version", super::generator_version),
    ("paper", super::paper),
    ("title_block", super::title_block),
    ("general", general),
    ("layers", layer_table),
    ("net", net),
    ("property", board_property),
];

const ENTITIES: &[(&str, EntityBinder)] = &[
    ("footprint", footprint),
    ("module", footprint),
    ("segment", track),
    ("arc", track),
    ("via", via),
    ("zone", zone),
    ("gr_line", graphic),
    ("gr_rect", graphic),
    ("gr_circle", graphic),
    ("gr_arc", graphic),
    ("gr_poly", graphic),
    ("gr_curve", graphic),
    ("gr_text", text),
];

pub(crate) fn bind(root: &SExpr) -> (Document, Diagnostics) {
    let mut b = Builder::<BoardData>::new();
    b.walk(root, METADATA, ENTITIES);
    check_nets(&mut b);
    b.finish(Body::Board)
}

/// Net references on pads, tracks, vias and zones must name a declared net.
fn check_nets(b: &mut Builder<BoardData>) {
    let nets = &b.body;
    let known = |n: u32| n == 0 || nets.nets.contains_key(&n);
    let mut missing = Vec::new();
    for (i, entity) in b.entities.iter().enumerate() {
        let id = EntityId(i);
        match entity {
            Entity::Footprint(fp) => {
                for pad in &fp.pads {
                    let Some(net) = &pad.net else { continue };
                    match (net.number, &net.name) {
                        (Some(n), _) if !known(n) => missing.push((n.to_string(), id)),
                        (None, Some(name)) if !name.is_empty() && !nets.has_net_named(name) => {
                            missing.push((name.clone(), id))
                        }
                        _ => {}
                    }
                }
            }
            Entity::Track(Track { net: Some(n), .. })
            | Entity::Via(Via { net: Some(n), .. })
            | Entity::Zone(Zone { net: Some(n), .. })
                if !known(*n) =>
            {
                missing.push((n.to_string(), id))
            }
            _ => {}
        }
    }
    for (net, id) in missing {
        b.dangling(ReferenceKind::Net, net, Some(id));
    }
}

// ─── Root tables ─────────────────────────────────────────────────────

fn general(b: &mut Builder<BoardData>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    b.body.thickness = Fields::new("general", node).kw_number("thickness")?;
    Ok(())
}

/// `(layers (0 "F.Cu" signal) (31 "B.Cu" signal) (44 "Edge.Cuts" user) ...)`
fn layer_table(b: &mut Builder<BoardData>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    for entry in node.children() {
        let items = entry.items();
        if items.len() < 2 {
            continue;
        }
        let ordinal = items[0]
            .as_f64()
            .ok_or_else(|| SchemaError::new("layers", entry, "layer ordinal must be a number"))?;
        let name = items[1]
            .text()
            .ok_or_else(|| SchemaError::new("layers", entry, "missing layer name"))?;
        b.body.layers.push(Layer {
            ordinal: ordinal as u32,
            name: name.into_owned(),
            kind: items.get(2).and_then(|k| k.text()).unwrap_or_default().into_owned(),
            user_name: items.get(3).and_then(|u| u.text()).map(|u| u.into_owned()),
        });
    }
    Ok(())
}

/// `(net 1 "GND")`
fn net(b: &mut Builder<BoardData>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let number = number_at("net", node, 0, "net number")?;
    let name = node.text_at(1).unwrap_or_default().into_owned();
    b.body.nets.insert(number as u32, name);
    Ok(())
}

fn board_property(b: &mut Builder<BoardData>, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let f = Fields::new("property", node);
    b.body
        .properties
        .insert(f.text(0, "property name")?, f.text(1, "property value")?);
    Ok(())
}

// ─── Footprints ──────────────────────────────────────────────────────

const FOOTPRINT_RULES: &[Rule<Footprint>] = &[
    ("property", fp_property),
    ("fp_text", fp_text),
    ("fp_line", fp_graphic),
    ("fp_rect", fp_graphic),
    ("fp_circle", fp_graphic),
    ("fp_arc", fp_graphic),
    ("fp_poly", fp_graphic),
    ("fp_curve", fp_graphic),
    ("pad", fp_pad),
];

fn footprint(head: &str, node: &SExpr, diags: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let mut fp = Footprint::new(f.text(0, "footprint library id")?);
    if let Some((at, rotation)) = f.at()? {
        fp.at = at;
        fp.rotation = normalize_angle(rotation);
    }
    if let Some(layer) = f.kw_text("layer")? {
        fp.layer = layer;
    }
    fp.uuid = f.uuid();
    fp.locked = f.flag("locked");
    fp.attr = f.get("attr").and_then(|a| a.text_at(0)).map(|a| a.into_owned());
    fp.extra = dispatch(&mut fp, f.rest(), FOOTPRINT_RULES, diags);
    debug!(
        "footprint {} with {} pads",
        fp.reference().unwrap_or(&fp.lib_id),
        fp.pads.len()
    );
    Ok(Entity::Footprint(fp))
}

fn fp_property(fp: &mut Footprint, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let p = common::property(node)?;
    fp.properties.insert(p.name.clone(), p);
    Ok(())
}

/// `(fp_text reference "R1" ...)` and `value` become properties; `user`
/// text stays free text.
fn fp_text(fp: &mut Footprint, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let f = Fields::new("fp_text", node);
    let kind = f.text(0, "text kind")?;
    let text = common::text("fp_text", node, 1)?;
    let name = match kind.as_str() {
        "reference" => "Reference",
        "value" => "Value",
        _ => {
            fp.texts.push(text);
            return Ok(());
        }
    };
    fp.properties.insert(
        name.to_string(),
        Property {
            name: name.to_string(),
            value: text.text,
            id: None,
            at: text.at,
            rotation: text.rotation,
            visible: !text.effects.hidden,
        },
    );
    Ok(())
}

fn fp_graphic(fp: &mut Footprint, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    let head = node.tag().unwrap_or_default();
    fp.graphics.push(common::graphic(head, node)?);
    Ok(())
}

fn fp_pad(fp: &mut Footprint, node: &SExpr, _: &mut Diagnostics) -> Result<(), SchemaError> {
    fp.pads.push(pad(node)?);
    Ok(())
}

/// `(pad "1" smd roundrect (at x y [angle]) (size w h) (layers ...) (net n "name"))`
pub(crate) fn pad(node: &SExpr) -> Result<Pad, SchemaError> {
    let f = Fields::new("pad", node);
    let number = f.text(0, "pad number")?;
    let kind_text = f.text(1, "pad type")?;
    let kind = PadKind::from_keyword(&kind_text)
        .ok_or_else(|| f.error(format!("unknown pad type `{kind_text}`")))?;
    let shape = f.text(2, "pad shape")?;
    let (at, rotation) = f.at()?.ok_or_else(|| f.error("missing (at x y)"))?;
    let size = f.kw_xy("size")?.ok_or_else(|| f.error("missing (size w h)"))?;

    let drill = match f.get("drill") {
        Some(d) => Some(drill(d)?),
        None => None,
    };

    let net = f.get("net").map(|n| match n.children().first() {
        Some(SExpr::Number(v)) => PadNet {
            number: Some(*v as u32),
            name: n.text_at(1).map(|t| t.into_owned()),
        },
        _ => PadNet {
            number: None,
            name: n.text_at(0).map(|t| t.into_owned()),
        },
    });

    Ok(Pad {
        number,
        kind,
        shape,
        at,
        rotation: normalize_angle(rotation),
        size,
        drill,
        net,
        layers: layers(&f),
        uuid: f.uuid(),
    })
}

/// `(drill 0.8)`, `(drill oval 1.0 2.0)`, optionally with `(offset x y)`.
fn drill(node: &SExpr) -> Result<Drill, SchemaError> {
    let f = Fields::new("drill", node);
    let oval = f.flag("oval");
    let first = usize::from(oval);
    let size = if f.positional().len() > first {
        let w = f.number(first, "drill size")?;
        let h = if f.positional().len() > first + 1 {
            f.number(first + 1, "drill height")?
        } else {
            w
        };
        Point::new(w, h)
    } else {
        Point::ORIGIN
    };
    Ok(Drill {
        oval,
        size,
        offset: f.kw_xy("offset")?.unwrap_or_default(),
    })
}

// ─── Tracks, vias, zones ─────────────────────────────────────────────

fn net_number(f: &Fields) -> Result<Option<u32>, SchemaError> {
    match f.get("net") {
        None => Ok(None),
        Some(n) => Ok(Some(number_at("net", n, 0, "net number")? as u32)),
    }
}

fn required_layer(f: &Fields) -> Result<String, SchemaError> {
    f.kw_text("layer")?
        .ok_or_else(|| f.error("missing (layer ...)"))
}

fn track(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let start = f.kw_xy("start")?.ok_or_else(|| f.error("missing (start x y)"))?;
    let end = f.kw_xy("end")?.ok_or_else(|| f.error("missing (end x y)"))?;
    let shape = if head == "arc" {
        let mid = f.kw_xy("mid")?.ok_or_else(|| f.error("missing (mid x y)"))?;
        TrackShape::Arc { mid }
    } else {
        TrackShape::Line
    };
    Ok(Entity::Track(Track {
        shape,
        start,
        end,
        width: f.kw_number("width")?.unwrap_or(DEFAULT_TRACK_WIDTH),
        layer: required_layer(&f)?,
        net: net_number(&f)?,
        uuid: f.uuid(),
    }))
}

fn via(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let (at, _) = f.at()?.ok_or_else(|| f.error("missing (at x y)"))?;
    Ok(Entity::Via(Via {
        at,
        size: f.kw_number("size")?.unwrap_or(DEFAULT_VIA_SIZE),
        drill: f.kw_number("drill")?.unwrap_or(DEFAULT_VIA_DRILL),
        layers: layers(&f),
        net: net_number(&f)?,
        uuid: f.uuid(),
    }))
}

fn zone(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    let f = Fields::new(head, node);
    let outline = match f.get("polygon").and_then(|p| p.find("pts")) {
        Some(pts) => common::pts(pts)?,
        None => Vec::new(),
    };
    let mut zone_layers = layers(&f);
    if let Some(layer) = f.kw_text("layer")? {
        zone_layers.insert(0, layer);
    }
    let net = net_number(&f)?;
    Ok(Entity::Zone(Zone {
        net,
        net_name: f.kw_text("net_name")?,
        name: f.kw_text("name")?,
        layers: zone_layers,
        outline,
        uuid: f.uuid(),
        extra: f.extra(),
    }))
}

fn graphic(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    Ok(Entity::Graphic(common::graphic(head, node)?))
}

fn text(head: &str, node: &SExpr, _: &mut Diagnostics) -> Result<Entity, SchemaError> {
    Ok(Entity::Text(common::text(head, node, 0)?))
}
