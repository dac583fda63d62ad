//! Spatial index data model: `Collection`, `FileRef`,
//! `SpatialIndex`, and the on-disk JSON schema they're loaded from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ElevationError;
use crate::geometry::BoundingBox;

/// Schema versions this build knows how to load.
pub const SUPPORTED_SCHEMA_VERSIONS: [&str; 1] = ["1.0.0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "AU")]
    Au,
    #[serde(rename = "NZ")]
    Nz,
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Country::Au => write!(f, "AU"),
            Country::Nz => write!(f, "NZ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Dem,
    Dsm,
}

/// One raster tile within a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub uri: String,
    pub bounds_native: BoundingBoxDto,
    pub size_bytes: u64,
    pub filename: String,
}

impl FileRef {
    pub fn bounds_native(&self) -> BoundingBox {
        self.bounds_native.to_bbox()
    }
}

/// Serializable bounding box, since `BoundingBox` itself carries no
/// `serde` derive (kept pure in `geometry::bbox`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBoxDto {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub crs: u32,
}

impl BoundingBoxDto {
    pub fn to_bbox(self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.max_x, self.max_y, self.crs)
    }

    pub fn from_bbox(bbox: BoundingBox) -> Self {
        Self {
            min_x: bbox.min_x,
            max_x: bbox.max_x,
            min_y: bbox.min_y,
            max_y: bbox.max_y,
            crs: bbox.crs,
        }
    }
}

/// One survey campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub country: Country,
    pub name: String,
    pub survey_year: Option<i32>,
    pub resolution_m: f64,
    pub native_crs: u32,
    pub bounds_wgs84: BoundingBoxDto,
    pub bounds_native: Option<BoundingBoxDto>,
    pub data_type: DataType,
    pub file_count: usize,
    pub files: Vec<FileRef>,
}

impl Collection {
    pub fn bounds_wgs84(&self) -> BoundingBox {
        self.bounds_wgs84.to_bbox()
    }
}

/// On-disk spatial index document: `{schema_version,
/// bounds_crs, data_collections}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialIndexDocument {
    pub schema_version: String,
    pub bounds_crs: HashMap<String, String>,
    pub data_collections: Vec<Collection>,
}

impl SpatialIndexDocument {
    pub fn parse(raw: &str) -> Result<Self, ElevationError> {
        serde_json::from_str(raw)
            .map_err(|e| ElevationError::Internal(format!("spatial index parse error: {e}")))
    }

    /// Startup validation: reject any index whose schema
    /// version is unsupported, whose `bounds_crs` tags are missing, or
    /// whose per-collection `native_crs` disagrees with its country's
    /// declared CRS.
    pub fn validate(&self) -> Result<(), ElevationError> {
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&self.schema_version.as_str()) {
            return Err(ElevationError::Internal(format!(
                "unsupported spatial index schema version: {}",
                self.schema_version
            )));
        }

        for country in ["AU", "NZ"] {
            if !self.bounds_crs.contains_key(country) {
                return Err(ElevationError::Internal(format!(
                    "spatial index missing bounds_crs tag for {country}"
                )));
            }
        }

        for collection in &self.data_collections {
            let declared = parse_epsg(self.bounds_crs.get(&collection.country.to_string()).ok_or_else(
                || {
                    ElevationError::Internal(format!(
                        "spatial index missing bounds_crs tag for {}",
                        collection.country
                    ))
                },
            )?)?;

            match collection.country {
                Country::Au => {
                    let allowed = [28354, 28355, 28356];
                    if !allowed.contains(&collection.native_crs) {
                        return Err(ElevationError::Internal(format!(
                            "AU collection {} has unexpected native_crs {}",
                            collection.id, collection.native_crs
                        )));
                    }
                }
                Country::Nz => {
                    if collection.native_crs != 2193 && collection.native_crs != 4326 {
                        return Err(ElevationError::Internal(format!(
                            "NZ collection {} has unexpected native_crs {}",
                            collection.id, collection.native_crs
                        )));
                    }
                }
            }

            // `bounds_crs` declares the country's reference CRS; the
            // collection's own native CRS is allowed to be WGS84 instead
            // (e.g. a pure-WGS84 NZ collection), but if it's neither WGS84
            // nor the declared CRS, that's invalid.
            if collection.native_crs != 4326 && collection.native_crs != declared {
                let declared_is_utm_zone = matches!(collection.country, Country::Au);
                if !declared_is_utm_zone {
                    return Err(ElevationError::Internal(format!(
                        "collection {} native_crs {} disagrees with declared CRS {}",
                        collection.id, collection.native_crs, declared
                    )));
                }
            }

            let bounds_native_present = collection.bounds_native.is_some();
            let expect_present = collection.native_crs != 4326;
            if bounds_native_present != expect_present {
                return Err(ElevationError::Internal(format!(
                    "collection {} bounds_native presence disagrees with native_crs",
                    collection.id
                )));
            }
        }

        Ok(())
    }
}

fn parse_epsg(tag: &str) -> Result<u32, ElevationError> {
    tag.strip_prefix("EPSG:")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ElevationError::Internal(format!("malformed EPSG tag: {tag}")))
}
