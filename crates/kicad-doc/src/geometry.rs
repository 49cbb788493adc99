use std::f64::consts::PI;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// Round a float to N decimal places.
pub fn round_f64(v: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (v * factor).round() / factor
}

/// A point in document units (millimetres, y pointing down).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        [round_f64(self.x, 6), round_f64(self.y, 6)].serialize(s)
    }
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

// ─── Bounding Box ────────────────────────────────────────────────────

/// Axis-aligned box. Always satisfies `min <= max` on both axes; a point box
/// is legal and contains its point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl Serialize for BBox {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut st = s.serialize_struct("BBox", 4)?;
        st.serialize_field("minx", &round_f64(self.min.x, 6))?;
        st.serialize_field("miny", &round_f64(self.min.y, 6))?;
        st.serialize_field("maxx", &round_f64(self.max.x, 6))?;
        st.serialize_field("maxy", &round_f64(self.max.y, 6))?;
        st.end()
    }
}

impl BBox {
    /// Box spanning two corners in any order.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing all points, or `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bbox = Self::from_point(iter.next()?);
        for p in iter {
            bbox.expand_point(p);
        }
        Some(bbox)
    }

    pub fn around(center: Point, half_width: f64, half_height: f64) -> Self {
        Self::new(
            center.offset(-half_width, -half_height),
            center.offset(half_width, half_height),
        )
    }

    pub fn expand_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        let mut out = *self;
        out.expand_point(other.min);
        out.expand_point(other.max);
        out
    }

    /// Uniform growth on every side. Negative amounts shrink, but never past
    /// the centre.
    pub fn grow(&self, d: f64) -> BBox {
        let c = self.center();
        BBox {
            min: Point::new((self.min.x - d).min(c.x), (self.min.y - d).min(c.y)),
            max: Point::new((self.max.x + d).max(c.x), (self.max.y + d).max(c.y)),
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        self.min.x <= p.x && p.x <= self.max.x && self.min.y <= p.y && p.y <= self.max.y
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }
}

// ─── Rotation / placement ────────────────────────────────────────────

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_angle(deg: f64) -> f64 {
    let a = deg % 360.0;
    let a = if a < 0.0 { a + 360.0 } else { a };
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

pub fn deg2rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Rotate a point around the origin by `angle_deg`, counter-clockwise as
/// seen on screen (y down). Quarter turns are exact.
pub fn rotate(p: Point, angle_deg: f64) -> Point {
    let a = normalize_angle(angle_deg);
    if a == 0.0 {
        return p;
    } else if a == 90.0 {
        return Point::new(p.y, -p.x);
    } else if a == 180.0 {
        return Point::new(-p.x, -p.y);
    } else if a == 270.0 {
        return Point::new(-p.y, p.x);
    }
    let angle_rad = -deg2rad(a);
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();
    Point::new(p.x * cos_a - p.y * sin_a, p.x * sin_a + p.y * cos_a)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mirror {
    /// Mirrored about the horizontal axis (y flips).
    X,
    /// Mirrored about the vertical axis (x flips).
    Y,
}

/// Local-to-world placement: rotate, then mirror, then translate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub origin: Point,
    pub rotation: f64,
    pub mirror: Option<Mirror>,
}

impl Placement {
    pub fn new(origin: Point, rotation: f64) -> Self {
        Self {
            origin,
            rotation: normalize_angle(rotation),
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Option<Mirror>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn apply(&self, local: Point) -> Point {
        let r = rotate(local, self.rotation);
        let m = match self.mirror {
            Some(Mirror::X) => Point::new(r.x, -r.y),
            Some(Mirror::Y) => Point::new(-r.x, r.y),
            None => r,
        };
        m + self.origin
    }

    /// World box of a local box: its four transformed corners.
    pub fn apply_bbox(&self, local: &BBox) -> BBox {
        let corners = local.corners().map(|c| self.apply(c));
        let mut out = BBox::from_point(corners[0]);
        for c in &corners[1..] {
            out.expand_point(*c);
        }
        out
    }
}

// ─── Arcs ────────────────────────────────────────────────────────────

/// Circular arc from `start_angle` sweeping `sweep` degrees (signed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleArc {
    pub center: Point,
    pub radius: f64,
    pub start_angle: f64,
    pub sweep: f64,
}

fn angle_of(center: Point, p: Point) -> f64 {
    normalize_angle((p.y - center.y).atan2(p.x - center.x) * 180.0 / PI)
}

impl CircleArc {
    /// Arc through three points, or `None` when they are collinear.
    pub fn from_three_points(start: Point, mid: Point, end: Point) -> Option<Self> {
        let (ax, ay) = (start.x, start.y);
        let (bx, by) = (mid.x, mid.y);
        let (cx, cy) = (end.x, end.y);

        let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
        if d.abs() < 1e-10 {
            return None;
        }

        let ux = ((ax * ax + ay * ay) * (by - cy)
            + (bx * bx + by * by) * (cy - ay)
            + (cx * cx + cy * cy) * (ay - by))
            / d;
        let uy = ((ax * ax + ay * ay) * (cx - bx)
            + (bx * bx + by * by) * (ax - cx)
            + (cx * cx + cy * cy) * (bx - ax))
            / d;
        let center = Point::new(ux, uy);

        let s = angle_of(center, start);
        let m = angle_of(center, mid);
        let e = angle_of(center, end);
        let to_end = normalize_angle(e - s);
        let to_mid = normalize_angle(m - s);
        let sweep = if to_mid <= to_end {
            to_end
        } else {
            to_end - 360.0
        };

        Some(Self {
            center,
            radius: start.distance(center),
            start_angle: s,
            sweep,
        })
    }

    /// Legacy arc form: centre, start point and signed sweep.
    pub fn from_center(center: Point, start: Point, sweep: f64) -> Self {
        Self {
            center,
            radius: start.distance(center),
            start_angle: angle_of(center, start),
            sweep,
        }
    }

    pub fn point_at(&self, angle_deg: f64) -> Point {
        let a = deg2rad(angle_deg);
        Point::new(
            self.center.x + self.radius * a.cos(),
            self.center.y + self.radius * a.sin(),
        )
    }

    pub fn end_point(&self) -> Point {
        self.point_at(self.start_angle + self.sweep)
    }

    pub fn mid_point(&self) -> Point {
        self.point_at(self.start_angle + self.sweep / 2.0)
    }

    fn covers(&self, angle: f64) -> bool {
        if self.sweep >= 0.0 {
            normalize_angle(angle - self.start_angle) <= self.sweep
        } else {
            normalize_angle(self.start_angle - angle) <= -self.sweep
        }
    }

    /// Exact box: end points plus any axis extremes inside the sweep.
    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::from_point(self.point_at(self.start_angle));
        bbox.expand_point(self.end_point());
        for quadrant in [0.0, 90.0, 180.0, 270.0] {
            if self.covers(quadrant) {
                bbox.expand_point(self.point_at(quadrant));
            }
        }
        bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(450.0), 90.0);
        assert!(normalize_angle(-1e-18) < 360.0);
    }

    #[test]
    fn test_rotate_quarter_turns_exact() {
        let p = Point::new(1.0, 2.0);
        assert_eq!(rotate(p, 90.0), Point::new(2.0, -1.0));
        assert_eq!(rotate(p, 180.0), Point::new(-1.0, -2.0));
        assert_eq!(rotate(p, -90.0), Point::new(-2.0, 1.0));
    }

    #[test]
    fn test_rotate_general_matches_quarter() {
        let p = Point::new(3.0, -4.0);
        let q = rotate(p, 89.999999);
        assert_relative_eq!(q.x, -4.0, epsilon = 1e-5);
        assert_relative_eq!(q.y, -3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_placement_rotates_before_translating() {
        let place = Placement::new(Point::new(10.0, 20.0), 90.0);
        assert_eq!(place.apply(Point::new(1.0, 0.0)), Point::new(10.0, 19.0));
        let mirrored = place.with_mirror(Some(Mirror::X));
        assert_eq!(mirrored.apply(Point::new(1.0, 0.0)), Point::new(10.0, 21.0));
    }

    #[test]
    fn test_bbox_basics() {
        let b = BBox::new(Point::new(2.0, 3.0), Point::new(-1.0, 0.0));
        assert_eq!(b.min, Point::new(-1.0, 0.0));
        assert!(b.contains(Point::new(2.0, 3.0)));
        assert!(!b.contains(Point::new(2.1, 3.0)));
        let g = b.grow(1.0);
        assert!(g.contains(Point::new(3.0, 4.0)));
        let point = BBox::from_point(Point::new(5.0, 5.0));
        assert!(point.contains(Point::new(5.0, 5.0)));
        let shrunk = point.grow(-2.0);
        assert!(shrunk.min.x <= shrunk.max.x && shrunk.min.y <= shrunk.max.y);
        assert!(BBox::from_points(Vec::new()).is_none());
    }

    #[test]
    fn test_arc_three_points() {
        // Quarter circle from (1,0) through (cos45, sin45) to (0,1).
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let arc = CircleArc::from_three_points(
            Point::new(1.0, 0.0),
            Point::new(h, h),
            Point::new(0.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(arc.center.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(arc.radius, 1.0, epsilon = 1e-9);
        assert_relative_eq!(arc.sweep, 90.0, epsilon = 1e-9);
        let b = arc.bbox();
        assert_relative_eq!(b.max.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(b.max.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(b.min.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_bulge_included() {
        // Half circle from (-1,0) over (0,-1) to (1,0): top extreme must be in the box.
        let arc = CircleArc::from_three_points(
            Point::new(-1.0, 0.0),
            Point::new(0.0, -1.0),
            Point::new(1.0, 0.0),
        )
        .unwrap();
        let b = arc.bbox();
        assert_relative_eq!(b.min.y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(b.max.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collinear_arc() {
        assert!(CircleArc::from_three_points(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0)
        )
        .is_none());
    }
}
