//! Viewport geometry
//!
//! Axis-aligned rectangles in host layout units. Used by the visibility
//! tracker to compute how much of an element lies inside the viewport.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Area, treating negative extents as empty
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Overlapping region, or None when the rectangles do not overlap
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        if right > left && bottom > top {
            Some(Rect::new(left, top, right - left, bottom - top))
        } else {
            None
        }
    }

    /// Fraction of this rectangle's area that lies within `viewport`
    ///
    /// Returns 0.0 for an empty rectangle. Result is clamped to [0.0, 1.0].
    pub fn visible_ratio(&self, viewport: &Rect) -> f64 {
        let area = self.area();
        if area <= 0.0 || !area.is_finite() {
            return 0.0;
        }
        self.intersection(viewport)
            .map(|overlap| (overlap.area() / area).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }
}
