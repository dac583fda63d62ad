//! C2: Spatial Index — in-memory two-tier geometry index over collections
//! and, within a collection, files.

use rstar::{AABB, RTree, RTreeObject};

use crate::collections::{Collection, FileRef};
use crate::crs::CrsTransformer;
use crate::error::ElevationError;
use crate::geometry::QueryPoint;

/// R-tree entry: a collection's WGS84 envelope plus its index into the
/// owning `Vec<Collection>`, so lookups don't need to clone collections.
struct CollectionEntry {
    envelope: AABB<[f64; 2]>,
    index: usize,
}

impl RTreeObject for CollectionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// In-memory spatial index: an R-tree over collection WGS84 bounds, as a
/// coarse filter, backed by the owning `Vec<Collection>`.
pub struct SpatialIndex {
    collections: Vec<Collection>,
    tree: RTree<CollectionEntry>,
}

impl SpatialIndex {
    pub fn build(collections: Vec<Collection>) -> Self {
        let entries = collections
            .iter()
            .enumerate()
            .map(|(index, c)| {
                let b = c.bounds_wgs84();
                CollectionEntry {
                    envelope: AABB::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]),
                    index,
                }
            })
            .collect();
        Self {
            collections,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// `candidates(QueryPoint) -> Collection[]` — every collection whose
    /// `bounds_wgs84` contains the point, via the R-tree coarse filter.
    /// No particular order; prioritisation is the
    /// handler's job (C3).
    pub fn candidates(&self, query_point: &QueryPoint) -> Vec<&Collection> {
        let xy = [query_point.point.lon, query_point.point.lat];
        self.tree
            .locate_all_at_point(&xy)
            .map(|entry| &self.collections[entry.index])
            .collect()
    }

    /// `files_for(Collection, QueryPoint) -> FileRef[]` — every file in
    /// the collection whose `bounds_native` contains the point transformed
    /// to the collection's native CRS. Linear scan is permitted: collections
    /// rarely exceed a few thousand files.
    pub fn files_for<'a>(
        &self,
        collection: &'a Collection,
        query_point: &QueryPoint,
        transformer: &CrsTransformer,
    ) -> Result<Vec<&'a FileRef>, ElevationError> {
        // A collection with `bounds_native = null` (pure WGS84) uses the
        // WGS84 point directly for file-level checks.
        let native_crs = collection.native_crs;
        let projected = query_point.projected(native_crs, transformer)?;

        Ok(collection
            .files
            .iter()
            .filter(|file| {
                // Some NZ files store bounds in WGS84 rather than NZTM — use
                // the file's own declared CRS for the intersection test,
                // not the collection's.
                let file_bounds = file.bounds_native();
                if file_bounds.crs == native_crs {
                    file_bounds.contains(&projected)
                } else {
                    // File bounds are in a different CRS than the
                    // collection (e.g. WGS84 file in an NZTM collection) —
                    // re-project for just this file.
                    match query_point.projected(file_bounds.crs, transformer) {
                        Ok(p) => file_bounds.contains(&p),
                        Err(_) => false,
                    }
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{BoundingBoxDto, Country, DataType};
    use crate::geometry::Point;

    fn collection(id: &str, min: (f64, f64), max: (f64, f64)) -> Collection {
        Collection {
            id: id.to_string(),
            country: Country::Au,
            name: id.to_string(),
            survey_year: Some(2019),
            resolution_m: 1.0,
            native_crs: 4326,
            bounds_wgs84: BoundingBoxDto {
                min_x: min.0,
                min_y: min.1,
                max_x: max.0,
                max_y: max.1,
                crs: 4326,
            },
            bounds_native: None,
            data_type: DataType::Dem,
            file_count: 1,
            files: vec![FileRef {
                uri: format!("s3://bucket/{id}.tif"),
                bounds_native: BoundingBoxDto {
                    min_x: min.0,
                    min_y: min.1,
                    max_x: max.0,
                    max_y: max.1,
                    crs: 4326,
                },
                size_bytes: 1,
                filename: format!("{id}.tif"),
            }],
        }
    }

    #[test]
    fn candidates_matches_linear_scan() {
        // R-tree result set equals a linear scan over bounds_wgs84 for the
        // same point.
        let collections = vec![
            collection("a", (0.0, 0.0), (10.0, 10.0)),
            collection("b", (5.0, 5.0), (15.0, 15.0)),
            collection("c", (100.0, 100.0), (110.0, 110.0)),
        ];
        let linear: Vec<String> = collections
            .iter()
            .filter(|c| c.bounds_wgs84().contains_xy(7.0, 7.0))
            .map(|c| c.id.clone())
            .collect();

        let index = SpatialIndex::build(collections);
        let qp = QueryPoint::new(Point::new(7.0, 7.0).unwrap());
        let mut from_tree: Vec<String> = index.candidates(&qp).into_iter().map(|c| c.id.clone()).collect();
        let mut linear = linear;
        from_tree.sort();
        linear.sort();
        assert_eq!(from_tree, linear);
    }

    #[test]
    fn edge_point_is_contained() {
        let collections = vec![collection("edge", (0.0, 0.0), (10.0, 10.0))];
        let index = SpatialIndex::build(collections);
        let qp = QueryPoint::new(Point::new(0.0, 0.0).unwrap());
        assert_eq!(index.candidates(&qp).len(), 1);
    }

    #[test]
    fn files_for_uses_file_declared_crs_when_it_differs() {
        let transformer = CrsTransformer::new();
        let mut c = collection("nz", (0.0, 0.0), (10.0, 10.0));
        c.native_crs = 2193;
        c.bounds_native = Some(BoundingBoxDto {
            min_x: 1_000_000.0,
            min_y: 5_000_000.0,
            max_x: 2_000_000.0,
            max_y: 6_000_000.0,
            crs: 2193,
        });
        // File stores bounds in WGS84 even though the collection is NZTM.
        c.files[0].bounds_native = BoundingBoxDto {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 10.0,
            crs: 4326,
        };

        let index = SpatialIndex::build(vec![c]);
        let qp = QueryPoint::new(Point::new(5.0, 5.0).unwrap());
        let files = index.files_for(&index.collections()[0], &qp, &transformer).unwrap();
        assert_eq!(files.len(), 1);
    }
}
