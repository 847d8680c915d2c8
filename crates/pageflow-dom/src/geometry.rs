//! Geometry
//!
//! Rectangles in document coordinates (CSS pixels).

/// DomRect - rectangle geometry
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DomRect {
    /// Create with dimensions
    pub const fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Get intersection rect (None when the rects do not overlap)
    pub fn intersection(&self, other: &DomRect) -> Option<DomRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right > x && bottom > y {
            Some(DomRect::from_xywh(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Grow the rect by `margin` on every side
    pub fn expand(&self, margin: f64) -> DomRect {
        DomRect {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }

    /// Fraction of `self` covered by `root` (0.0 - 1.0)
    ///
    /// Zero-area targets count as fully visible when they sit inside the root.
    pub fn visible_ratio(&self, root: &DomRect) -> f64 {
        let area = self.area();
        if area == 0.0 {
            let inside = self.x >= root.x
                && self.x <= root.right()
                && self.y >= root.y
                && self.y <= root.bottom();
            return if inside { 1.0 } else { 0.0 };
        }
        self.intersection(root)
            .map(|i| (i.area() / area).min(1.0))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = DomRect::from_xywh(0.0, 0.0, 100.0, 100.0);
        let b = DomRect::from_xywh(50.0, 50.0, 100.0, 100.0);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, DomRect::from_xywh(50.0, 50.0, 50.0, 50.0));

        let far = DomRect::from_xywh(500.0, 500.0, 10.0, 10.0);
        assert!(a.intersection(&far).is_none());
    }

    #[test]
    fn test_touching_edges_do_not_intersect() {
        let a = DomRect::from_xywh(0.0, 0.0, 100.0, 100.0);
        let b = DomRect::from_xywh(0.0, 100.0, 100.0, 100.0);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_visible_ratio_with_margin() {
        let viewport = DomRect::from_xywh(0.0, 0.0, 800.0, 600.0);
        let target = DomRect::from_xywh(0.0, 620.0, 100.0, 100.0);

        assert_eq!(target.visible_ratio(&viewport), 0.0);
        let ratio = target.visible_ratio(&viewport.expand(50.0));
        assert!((ratio - 0.3).abs() < 1e-9);
    }
}
