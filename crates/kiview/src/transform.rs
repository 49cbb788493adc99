use kicad_doc::geometry::{BBox, Point};
use serde::Serialize;

/// World to screen mapping: `screen = scale * (world - origin)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportTransform {
    /// World point shown at the screen's top-left corner.
    pub origin: Point,
    /// Screen pixels per world unit.
    pub scale: f64,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            origin: Point::ORIGIN,
            scale: 1.0,
        }
    }
}

impl ViewportTransform {
    pub fn new(origin: Point, scale: f64) -> Self {
        Self { origin, scale }
    }

    pub fn world_to_screen(&self, p: Point) -> Point {
        Point::new(
            self.scale * (p.x - self.origin.x),
            self.scale * (p.y - self.origin.y),
        )
    }

    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new(p.x / self.scale + self.origin.x, p.y / self.scale + self.origin.y)
    }

    /// Centre `bbox` in a `width` x `height` screen, as large as fits.
    /// A degenerate box keeps scale 1 and is only centred.
    pub fn fit_to_bbox(bbox: &BBox, width: f64, height: f64) -> Self {
        let mut scale = (width / bbox.width()).min(height / bbox.height());
        if !scale.is_finite() || scale <= 0.0 {
            scale = 1.0;
        }
        let c = bbox.center();
        let origin = Point::new(c.x - width / (2.0 * scale), c.y - height / (2.0 * scale));
        Self { origin, scale }
    }

    /// Multiply the scale by `factor`, keeping the world point under
    /// `screen` fixed. The resulting scale is kept within `min` and `max`,
    /// in either order; a NaN bound is ignored.
    pub fn zoom_at(&mut self, screen: Point, factor: f64, min: f64, max: f64) {
        let anchor = self.screen_to_world(screen);
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let scale = (self.scale * factor).max(lo).min(hi);
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        self.scale = scale;
        self.origin = Point::new(anchor.x - screen.x / scale, anchor.y - screen.y / scale);
    }

    /// Move the view by a screen-pixel delta; content follows the pointer.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.origin = self.origin.offset(-dx / self.scale, -dy / self.scale);
    }

    /// World-space box currently visible in a `width` x `height` screen.
    pub fn visible(&self, width: f64, height: f64) -> BBox {
        BBox::new(
            self.origin,
            self.screen_to_world(Point::new(width, height)),
        )
    }
}

/// Wheel delta to zoom factor, limited to halving or doubling per event.
pub fn wheel_zoom_factor(delta_y: f64) -> f64 {
    1.1f64.powf(-delta_y / 40.0).clamp(0.5, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Point::new(0.0, 0.0), 1.0)]
    #[case(Point::new(-13.5, 220.25), 0.37)]
    #[case(Point::new(1e4, -1e4), 42.0)]
    fn test_inverse_law(#[case] origin: Point, #[case] scale: f64) {
        let t = ViewportTransform::new(origin, scale);
        for p in [Point::new(0.0, 0.0), Point::new(3.3, -7.1), Point::new(-1e3, 1e3)] {
            let back = t.screen_to_world(t.world_to_screen(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-9, max_relative = 1e-12);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-9, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_fit_centres_extent() {
        let bbox = BBox::new(Point::new(10.0, 20.0), Point::new(30.0, 30.0));
        let t = ViewportTransform::fit_to_bbox(&bbox, 400.0, 400.0);
        assert_relative_eq!(t.scale, 20.0);
        let c = t.world_to_screen(bbox.center());
        assert_relative_eq!(c.x, 200.0, epsilon = 1e-9);
        assert_relative_eq!(c.y, 200.0, epsilon = 1e-9);
        let tl = t.world_to_screen(bbox.min);
        assert_relative_eq!(tl.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(tl.y, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_degenerate_box() {
        let bbox = BBox::from_point(Point::new(5.0, 5.0));
        let t = ViewportTransform::fit_to_bbox(&bbox, 100.0, 50.0);
        assert_eq!(t.scale, 1.0);
        assert_eq!(t.world_to_screen(Point::new(5.0, 5.0)), Point::new(50.0, 25.0));
    }

    #[test]
    fn test_zoom_keeps_point_fixed() {
        let mut t = ViewportTransform::new(Point::new(3.0, 4.0), 2.0);
        let screen = Point::new(120.0, 80.0);
        let before = t.screen_to_world(screen);
        t.zoom_at(screen, 1.5, 0.01, 100.0);
        assert_relative_eq!(t.scale, 3.0);
        let after = t.screen_to_world(screen);
        assert_relative_eq!(after.x, before.x, epsilon = 1e-9);
        assert_relative_eq!(after.y, before.y, epsilon = 1e-9);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut t = ViewportTransform::default();
        t.zoom_at(Point::ORIGIN, 1000.0, 0.1, 50.0);
        assert_eq!(t.scale, 50.0);
    }

    #[test]
    fn test_zoom_with_reversed_or_nan_bounds() {
        let mut t = ViewportTransform::default();
        t.zoom_at(Point::ORIGIN, 2.0, 10.0, 1.0);
        assert_eq!(t.scale, 2.0);
        t.zoom_at(Point::ORIGIN, 100.0, 10.0, 1.0);
        assert_eq!(t.scale, 10.0);
        t.zoom_at(Point::ORIGIN, 0.5, f64::NAN, f64::NAN);
        assert_eq!(t.scale, 5.0);
    }

    #[test]
    fn test_pan_moves_content_with_pointer() {
        let mut t = ViewportTransform::new(Point::ORIGIN, 4.0);
        let p = Point::new(10.0, 10.0);
        let before = t.world_to_screen(p);
        t.pan_by(8.0, -4.0);
        let after = t.world_to_screen(p);
        assert_relative_eq!(after.x - before.x, 8.0, epsilon = 1e-9);
        assert_relative_eq!(after.y - before.y, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wheel_zoom_factor_limits() {
        assert_eq!(wheel_zoom_factor(-1e6), 2.0);
        assert_eq!(wheel_zoom_factor(1e6), 0.5);
        assert_eq!(wheel_zoom_factor(0.0), 1.0);
    }
}
