pub mod bbox;
pub mod point;

pub use bbox::BoundingBox;
pub use point::{Point, ProjectedPoint, QueryPoint};
