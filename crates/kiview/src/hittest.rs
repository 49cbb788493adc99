use kicad_doc::geometry::{BBox, Point};
use kicad_doc::types::{Document, EntityId};

/// Padded entity boxes of one document, in draw order.
///
/// Rebuilt whenever a new document is shown; never patched.
#[derive(Debug, Clone)]
pub struct HitTester {
    boxes: Vec<BBox>,
    tolerance: f64,
}

impl HitTester {
    pub fn new(doc: &Document, tolerance: f64) -> Self {
        let boxes = doc.bboxes().iter().map(|b| b.grow(tolerance)).collect();
        Self { boxes, tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Padded box of one entity.
    pub fn bbox(&self, id: EntityId) -> Option<BBox> {
        self.boxes.get(id.0).copied()
    }

    /// Topmost entity whose padded box contains `p`. Later entities are
    /// drawn above earlier ones.
    pub fn hit(&self, p: Point) -> Option<EntityId> {
        self.boxes
            .iter()
            .rposition(|b| b.contains(p))
            .map(EntityId)
    }

    /// Every entity under `p`, topmost first.
    pub fn hit_all(&self, p: Point) -> Vec<EntityId> {
        self.boxes
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, b)| b.contains(p))
            .map(|(i, _)| EntityId(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        kicad_doc::load_str(text).unwrap().document
    }

    #[test]
    fn test_topmost_wins() {
        let d = doc("(kicad_sch (junction (at 0 0) (diameter 2)) (junction (at 0.5 0) (diameter 2)))");
        let ht = HitTester::new(&d, 0.0);
        assert_eq!(ht.hit(Point::new(0.2, 0.0)), Some(EntityId(1)));
        assert_eq!(ht.hit(Point::new(-0.9, 0.0)), Some(EntityId(0)));
        assert_eq!(ht.hit_all(Point::new(0.2, 0.0)), vec![EntityId(1), EntityId(0)]);
        assert_eq!(ht.hit(Point::new(5.0, 5.0)), None);
    }

    #[test]
    fn test_identity_not_value() {
        // Two identical junctions: the hit is the later handle.
        let d = doc("(kicad_sch (junction (at 1 1) (diameter 1)) (junction (at 1 1) (diameter 1)))");
        let ht = HitTester::new(&d, 0.1);
        assert_eq!(ht.hit(Point::new(1.0, 1.0)), Some(EntityId(1)));
    }

    #[test]
    fn test_non_overlapping_boxes_are_exclusive() {
        let d = doc(
            "(kicad_sch (no_connect (at 0 0)) (no_connect (at 10 0)) (no_connect (at 20 0)) (no_connect (at 30 0)))",
        );
        let ht = HitTester::new(&d, 0.5);
        for step in 0..=400 {
            let p = Point::new(-5.0 + step as f64 * 0.1, 0.3);
            assert!(ht.hit_all(p).len() <= 1, "overlap at {p:?}");
        }
        assert_eq!(ht.hit(Point::new(10.0 + 0.635 + 0.4, 0.0)), Some(EntityId(1)));
        assert_eq!(ht.hit(Point::new(10.0 + 0.635 + 0.6, 0.0)), None);
    }

    #[test]
    fn test_tolerance_pads_boxes() {
        let d = doc("(kicad_pcb (via (at 0 0) (size 1) (drill 0.5)))");
        assert_eq!(HitTester::new(&d, 0.0).hit(Point::new(0.7, 0.0)), None);
        let ht = HitTester::new(&d, 0.25);
        assert_eq!(ht.hit(Point::new(0.7, 0.0)), Some(EntityId(0)));
        assert_eq!(ht.tolerance(), 0.25);
    }
}
