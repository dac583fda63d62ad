//! Axis-aligned bounding boxes in a declared CRS.

use crate::geometry::point::ProjectedPoint;

/// `{min_x, max_x, min_y, max_y, crs}`. Invariant: `min_x <= max_x &&
/// min_y <= max_y`. Meaningful only in its declared CRS;
/// mixing CRSs across a containment test is a contract violation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub crs: u32,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: u32) -> Self {
        debug_assert!(min_x <= max_x, "min_x must be <= max_x");
        debug_assert!(min_y <= max_y, "min_y must be <= max_y");
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            crs,
        }
    }

    /// Closed-interval containment: a point
    /// exactly on an edge is contained.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Containment test against a point already projected into this bbox's
    /// CRS. Panics in debug builds if the CRS doesn't match — callers are
    /// responsible for projecting into the right CRS first.
    pub fn contains(&self, projected: &ProjectedPoint) -> bool {
        debug_assert_eq!(
            projected.epsg_code, self.crs,
            "bounding box containment test across mismatched CRS"
        );
        self.contains_xy(projected.x, projected.y)
    }
}
