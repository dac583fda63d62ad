//! WGS84 and projected point types.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::crs::CrsTransformer;
use crate::error::ElevationError;

/// A geographic point in WGS84 (EPSG:4326). Immutable, created at request
/// ingress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ElevationError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(ElevationError::Validation(
                "latitude/longitude must be finite".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ElevationError::Validation(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(ElevationError::Validation(format!(
                "longitude {lon} out of range [-180, 180]"
            )));
        }
        Ok(Self { lat, lon })
    }
}

/// A point projected into a specific EPSG CRS. Derived from a
/// `Point` by the CRS transformer (C1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
    pub epsg_code: u32,
}

/// A `Point` paired with a lazily-populated, per-request cache of its
/// projections. Transforms happen at most once per EPSG per request.
///
/// The cache is a `Mutex`, not a `RefCell`: this type is read from across
/// `.await` points in the fallback chain (one lookup per candidate source
/// or collection, each potentially separated by an awaited blocking raster
/// read), and axum/tokio require every future in the request path to be
/// `Send`. A `RefCell` would make `&QueryPoint` `!Send` and the whole HTTP
/// layer would fail to type-check; `Mutex` keeps interior mutability while
/// staying `Send + Sync`.
pub struct QueryPoint {
    pub point: Point,
    projected: Mutex<HashMap<u32, ProjectedPoint>>,
}

impl QueryPoint {
    pub fn new(point: Point) -> Self {
        Self {
            point,
            projected: Mutex::new(HashMap::new()),
        }
    }

    /// Return the point projected into `epsg_code`, transforming and
    /// caching on first use.
    pub fn projected(
        &self,
        epsg_code: u32,
        transformer: &CrsTransformer,
    ) -> Result<ProjectedPoint, ElevationError> {
        if epsg_code == 4326 {
            return Ok(ProjectedPoint {
                x: self.point.lon,
                y: self.point.lat,
                epsg_code,
            });
        }
        if let Some(cached) = self.projected.lock().unwrap().get(&epsg_code) {
            return Ok(*cached);
        }
        let projected = transformer.transform(self.point, epsg_code)?;
        self.projected.lock().unwrap().insert(epsg_code, projected);
        Ok(projected)
    }

    /// Number of distinct EPSG codes transformed so far this request — used
    /// by tests to assert the transform-once invariant.
    #[cfg(test)]
    pub fn transform_count(&self) -> usize {
        self.projected.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(Point::new(91.0, 0.0).is_err());
        assert!(Point::new(-91.0, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(Point::new(0.0, 181.0).is_err());
        assert!(Point::new(0.0, -181.0).is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(Point::new(90.0, 180.0).is_ok());
        assert!(Point::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn wgs84_projection_is_identity_without_transformer() {
        let p = Point::new(-27.4698, 153.0251).unwrap();
        let qp = QueryPoint::new(p);
        let transformer = CrsTransformer::new();
        let projected = qp.projected(4326, &transformer).unwrap();
        assert_eq!(projected.x, p.lon);
        assert_eq!(projected.y, p.lat);
        assert_eq!(qp.transform_count(), 0); // 4326 never touches the cache
    }
}
