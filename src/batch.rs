//! C9: Batch / Line / Path Driver — fans out multiple point lookups with
//! bounded concurrency and reassembles them in the caller's original order.

use futures::stream::{self, StreamExt};
use geo::{Haversine, InterpolatePoint, Point as GeoPoint};

use crate::collections::DataType;
use crate::error::ElevationError;
use crate::geometry::{Point, QueryPoint};
use crate::orchestrator::Orchestrator;

/// One point's outcome within a multi-point response. `elevation_m: None`
/// is a per-point failure, not a whole-request failure.
#[derive(Debug, Clone)]
pub struct PointResult {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: Option<f64>,
    pub dem_source_used: Option<String>,
    pub resolution_m: Option<f64>,
    pub data_type: Option<DataType>,
    pub message: Option<String>,
}

async fn resolve_one(orchestrator: &Orchestrator, point: Point) -> PointResult {
    let query_point = QueryPoint::new(point);
    let resolution = orchestrator.resolve(&query_point).await;
    PointResult {
        latitude: point.lat,
        longitude: point.lon,
        elevation_m: resolution.elevation_m,
        dem_source_used: resolution.dem_source_used,
        resolution_m: resolution.resolution_m,
        data_type: resolution.data_type,
        message: resolution.message,
    }
}

/// Evaluate every point with at most `concurrency` in flight at once,
/// reassembling the response in the order the points were given.
pub async fn resolve_many(
    orchestrator: &Orchestrator,
    points: Vec<Point>,
    concurrency: usize,
) -> Vec<PointResult> {
    let mut indexed: Vec<(usize, PointResult)> = stream::iter(points.into_iter().enumerate().map(
        |(index, point)| async move { (index, resolve_one(orchestrator, point).await) },
    ))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

/// Validate a multi-point request doesn't exceed the configured limit.
/// Exceeding it fails the whole request rather than truncating silently.
pub fn check_batch_size(len: usize, max_batch_size: usize) -> Result<(), ElevationError> {
    if len > max_batch_size {
        return Err(ElevationError::Validation(format!(
            "batch of {len} points exceeds the maximum of {max_batch_size}"
        )));
    }
    Ok(())
}

/// `num_points` equally spaced points from `start` to `end` inclusive,
/// interpolated along the great-circle path rather than linearly in
/// lat/lon, so a line crossing a large span of longitude doesn't bow away
/// from the geodesic a caller actually expects.
pub fn interpolate_line(start: Point, end: Point, num_points: usize) -> Result<Vec<Point>, ElevationError> {
    if num_points < 2 {
        return Err(ElevationError::Validation(
            "num_points must be at least 2".to_string(),
        ));
    }

    let start_geo = GeoPoint::new(start.lon, start.lat);
    let end_geo = GeoPoint::new(end.lon, end.lat);

    let mut points = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let ratio = i as f64 / (num_points - 1) as f64;
        let p = if i == 0 {
            start_geo
        } else if i == num_points - 1 {
            end_geo
        } else {
            Haversine.point_at_ratio_between(start_geo, end_geo, ratio)
        };
        points.push(Point::new(p.y(), p.x())?);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_at_limit_succeeds() {
        assert!(check_batch_size(500, 500).is_ok());
    }

    #[test]
    fn batch_size_over_limit_fails() {
        assert!(check_batch_size(501, 500).is_err());
    }

    #[test]
    fn line_of_two_points_returns_endpoints_exactly() {
        let start = Point::new(-27.4698, 153.0251).unwrap();
        let end = Point::new(-27.4700, 153.0260).unwrap();
        let points = interpolate_line(start, end, 2).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], start);
        assert_eq!(points[1], end);
    }

    #[test]
    fn line_interior_points_are_monotone_in_latitude() {
        let start = Point::new(-27.0, 153.0).unwrap();
        let end = Point::new(-28.0, 153.0).unwrap();
        let points = interpolate_line(start, end, 5).unwrap();
        assert_eq!(points.len(), 5);
        for pair in points.windows(2) {
            assert!(pair[1].lat < pair[0].lat);
        }
    }

    #[test]
    fn rejects_fewer_than_two_points() {
        let start = Point::new(0.0, 0.0).unwrap();
        let end = Point::new(1.0, 1.0).unwrap();
        assert!(interpolate_line(start, end, 1).is_err());
    }
}
