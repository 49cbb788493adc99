//! Field groups shared by schematic and board grammars.

use crate::error::{Diagnostic, SchemaError};
use crate::geometry::{CircleArc, Point};
use crate::parsers::fields::{number_at, opt_number_at, xy, Fields};
use crate::parsers::Diagnostics;
use crate::sexpr::SExpr;
use crate::types::{Effects, Fill, Graphic, Property, PropertyMap, Shape, Stroke, Text};

/// `(stroke (width w) (type t) (color r g b a))`, or a bare legacy `(width w)`.
pub(crate) fn stroke(f: &Fields) -> Result<Stroke, SchemaError> {
    if let Some(node) = f.get("stroke") {
        let s = Fields::new("stroke", node);
        let color = match s.get("color") {
            Some(c) => Some([
                number_at("color", c, 0, "red")?,
                number_at("color", c, 1, "green")?,
                number_at("color", c, 2, "blue")?,
                opt_number_at("color", c, 3, "alpha")?.unwrap_or(1.0),
            ]),
            None => None,
        };
        return Ok(Stroke {
            width: s.kw_number("width")?.unwrap_or(0.0),
            style: s.kw_text("type")?,
            color,
        });
    }
    Ok(Stroke {
        width: f.kw_number("width")?.unwrap_or(0.0),
        ..Stroke::default()
    })
}

/// `(fill (type solid))` in schematics, `(fill solid)` / `(fill yes)` on boards.
pub(crate) fn fill(f: &Fields) -> Fill {
    let Some(node) = f.get("fill") else {
        return Fill::None;
    };
    let keyword = node.value("type").or_else(|| node.text_at(0));
    keyword.map(|k| Fill::from_keyword(&k)).unwrap_or_default()
}

pub(crate) fn effects(node: &SExpr) -> Result<Effects, SchemaError> {
    let f = Fields::new("effects", node);
    let mut effects = Effects::default();
    if let Some(font) = f.get("font") {
        let font = Fields::new("font", font);
        if let Some(size) = font.get("size") {
            // (size height width)
            let hw = xy("size", size)?;
            effects.font_size = Point::new(hw.y, hw.x);
        }
        effects.thickness = font.kw_number("thickness")?;
        effects.bold = font.flag("bold");
        effects.italic = font.flag("italic");
    }
    if let Some(justify) = f.get("justify") {
        effects.justify = justify
            .children()
            .iter()
            .filter_map(|j| j.as_str().map(str::to_string))
            .collect();
    }
    effects.hidden = f.flag("hide");
    Ok(effects)
}

/// Effects of an item, defaulting when the item has none.
pub(crate) fn effects_of(f: &Fields) -> Result<Effects, SchemaError> {
    let mut out = match f.get("effects") {
        Some(node) => effects(node)?,
        None => Effects::default(),
    };
    if f.flag("hide") {
        out.hidden = true;
    }
    Ok(out)
}

/// `(property "Name" "Value" (id n) (at x y r) (effects ...))`.
pub(crate) fn property(node: &SExpr) -> Result<Property, SchemaError> {
    let f = Fields::new("property", node);
    let name = f.text(0, "property name")?;
    let value = f.text(1, "property value")?;
    let (at, rotation) = f.at()?.unwrap_or_default();
    let id = f.kw_number("id")?.map(|n| n as u32);
    let effects = effects_of(&f)?;
    Ok(Property {
        name,
        value,
        id,
        at,
        rotation,
        visible: !effects.hidden,
    })
}

/// Bind every `property` child into a map. A malformed property is dropped on
/// its own and reported.
pub(crate) fn properties(f: &Fields, diags: &mut Diagnostics) -> PropertyMap {
    let mut map = PropertyMap::new();
    for node in f.all("property") {
        match property(node) {
            Ok(p) => {
                map.insert(p.name.clone(), p);
            }
            Err(err) => {
                log::warn!("dropping property: {err}");
                diags.push(Diagnostic::Schema(err.within("property")));
            }
        }
    }
    map
}

/// `(pts (xy x y) ...)`. Arc segments inside outlines contribute their three
/// defining points.
pub(crate) fn pts(node: &SExpr) -> Result<Vec<Point>, SchemaError> {
    let mut points = Vec::new();
    for child in node.children() {
        match child.tag() {
            Some("xy") => points.push(xy("xy", child)?),
            Some("arc") => {
                let f = Fields::new("arc", child);
                for key in ["start", "mid", "end"] {
                    if let Some(p) = f.kw_xy(key)? {
                        points.push(p);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(points)
}

fn required_xy(f: &Fields, head: &str) -> Result<Point, SchemaError> {
    f.kw_xy(head)?
        .ok_or_else(|| f.error(format!("missing ({head} x y)")))
}

fn required_pts(f: &Fields) -> Result<Vec<Point>, SchemaError> {
    match f.get("pts") {
        Some(node) => pts(node),
        None => Err(f.error("missing (pts ...)")),
    }
}

/// Shape geometry for a drawing head, with `gr_`/`fp_` prefixes already removed.
pub(crate) fn shape(kind: &str, f: &Fields) -> Result<Shape, SchemaError> {
    Ok(match kind {
        "line" => match f.get("pts") {
            Some(node) => {
                let points = pts(node)?;
                if points.len() < 2 {
                    return Err(f.error("line needs two points"));
                }
                Shape::Line {
                    start: points[0],
                    end: points[points.len() - 1],
                }
            }
            None => Shape::Line {
                start: required_xy(f, "start")?,
                end: required_xy(f, "end")?,
            },
        },
        "rect" | "rectangle" => Shape::Rect {
            start: required_xy(f, "start")?,
            end: required_xy(f, "end")?,
        },
        "circle" => {
            let center = required_xy(f, "center")?;
            let radius = match f.kw_number("radius")? {
                Some(r) => r,
                None => required_xy(f, "end")?.distance(center),
            };
            Shape::Circle { center, radius }
        }
        "arc" => {
            if let Some(mid) = f.kw_xy("mid")? {
                Shape::Arc {
                    start: required_xy(f, "start")?,
                    mid,
                    end: required_xy(f, "end")?,
                }
            } else {
                // Legacy: start is the centre, end the start point, angle the sweep.
                let center = required_xy(f, "start")?;
                let from = required_xy(f, "end")?;
                let angle = f.kw_number("angle")?.unwrap_or(0.0);
                let arc = CircleArc::from_center(center, from, angle);
                Shape::Arc {
                    start: from,
                    mid: arc.mid_point(),
                    end: arc.end_point(),
                }
            }
        }
        "poly" => Shape::Polygon {
            points: required_pts(f)?,
        },
        "polyline" => Shape::Polyline {
            points: required_pts(f)?,
        },
        "curve" | "bezier" => Shape::Bezier {
            points: required_pts(f)?,
        },
        other => return Err(f.error(format!("unknown shape `{other}`"))),
    })
}

/// Strip the board/footprint prefix from a drawing head.
pub(crate) fn shape_kind(head: &str) -> &str {
    head.strip_prefix("gr_")
        .or_else(|| head.strip_prefix("fp_"))
        .unwrap_or(head)
}

pub(crate) fn graphic(head: &str, node: &SExpr) -> Result<Graphic, SchemaError> {
    let f = Fields::new(head, node);
    let shape = shape(shape_kind(head), &f)?;
    let default_fill = if matches!(shape, Shape::Polygon { .. }) && head.starts_with("gr_") {
        Fill::Solid
    } else {
        Fill::None
    };
    Ok(Graphic {
        stroke: stroke(&f)?,
        fill: if f.has("fill") { fill(&f) } else { default_fill },
        layer: f.kw_text("layer")?,
        uuid: f.uuid(),
        shape,
    })
}

/// `(text "..." (at ...) (effects ...))`, `gr_text`, or `fp_text user "..."`
/// where the string sits at `text_index`.
pub(crate) fn text(head: &str, node: &SExpr, text_index: usize) -> Result<Text, SchemaError> {
    let f = Fields::new(head, node);
    let text = f.text(text_index, "text")?;
    let (at, rotation) = f.at()?.unwrap_or_default();
    Ok(Text {
        text,
        at,
        rotation,
        effects: effects_of(&f)?,
        layer: f.kw_text("layer")?,
        uuid: f.uuid(),
    })
}

/// Layer names from `(layers a b ...)`.
pub(crate) fn layers(f: &Fields) -> Vec<String> {
    f.get("layers")
        .map(|l| {
            l.children()
                .iter()
                .filter_map(|c| c.text().map(|t| t.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}
