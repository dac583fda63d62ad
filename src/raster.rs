//! C4: Raster Sampler — open a remote GeoTIFF by object-storage URI,
//! compute the pixel for a projected coordinate, read one value, and
//! interpret nodata.

use std::collections::HashSet;
use std::ffi::CString;
use std::sync::{Arc, Mutex};

use gdal::Dataset;
use lru::LruCache;
use tracing::debug;

use crate::collections::FileRef;
use crate::error::ElevationError;
use crate::geometry::ProjectedPoint;

/// Outcome of sampling a single raster.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Found { elevation_m: f64, resolution_m: f64 },
    NotCovered,
    NoData,
}

/// Whether a URI's bucket requires signed (credentialed) or unsigned
/// access. Determined from a static mapping, not by the sampler managing
/// credentials itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketClass {
    Private,
    PublicUnsigned,
}

/// Parsed `s3://bucket/key` (or equivalent scheme-tagged locator).
struct ParsedUri {
    bucket: String,
    key: String,
}

fn parse_uri(uri: &str) -> Result<ParsedUri, ElevationError> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| ElevationError::Upstream(format!("unsupported URI scheme: {uri}")))?;
    let (bucket, key) = rest
        .split_once('/')
        .ok_or_else(|| ElevationError::Upstream(format!("malformed object storage URI: {uri}")))?;
    Ok(ParsedUri {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

/// Translate a scheme-tagged URI into a GDAL virtual-filesystem path.
/// Both bucket classes go through `/vsis3/` — GDAL honours
/// `AWS_NO_SIGN_REQUEST` for unsigned access to public buckets.
pub(crate) fn vsi_path(uri: &str) -> Result<String, ElevationError> {
    let parsed = parse_uri(uri)?;
    Ok(format!("/vsis3/{}/{}", parsed.bucket, parsed.key))
}

/// Bounded LRU of open dataset handles, keyed by URI. Handles are
/// reference-counted so an eviction never invalidates an in-flight read.
struct DatasetCache {
    inner: Mutex<LruCache<String, Arc<Mutex<Dataset>>>>,
}

impl DatasetCache {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    fn get(&self, uri: &str) -> Option<Arc<Mutex<Dataset>>> {
        self.inner.lock().unwrap().get(uri).cloned()
    }

    fn insert(&self, uri: String, dataset: Arc<Mutex<Dataset>>) {
        self.inner.lock().unwrap().put(uri, dataset);
    }
}

/// Set `AWS_NO_SIGN_REQUEST` for this thread only, via the raw
/// `CPLSetThreadLocalConfigOption` FFI rather than `gdal::config`'s
/// process-wide setter — the safe wrapper has no thread-scoped variant.
fn set_thread_local_unsigned(unsigned: bool) -> Result<(), ElevationError> {
    let key = CString::new("AWS_NO_SIGN_REQUEST").unwrap();
    let value = CString::new(if unsigned { "YES" } else { "NO" })
        .map_err(|e| ElevationError::Internal(format!("invalid GDAL config value: {e}")))?;
    unsafe {
        gdal_sys::CPLSetThreadLocalConfigOption(key.as_ptr(), value.as_ptr());
    }
    Ok(())
}

/// Unset the thread-local override so a later open on the same pool thread
/// doesn't inherit a stale signing mode from whichever bucket class was
/// opened here last.
fn clear_thread_local_unsigned() -> Result<(), ElevationError> {
    let key = CString::new("AWS_NO_SIGN_REQUEST").unwrap();
    unsafe {
        gdal_sys::CPLSetThreadLocalConfigOption(key.as_ptr(), std::ptr::null());
    }
    Ok(())
}

/// C4. One `RasterSampler` per process; `public_buckets` is the static
/// public-bucket membership set.
pub struct RasterSampler {
    public_buckets: HashSet<String>,
    cache: DatasetCache,
}

impl RasterSampler {
    pub fn new(public_buckets: HashSet<String>, cache_capacity: usize) -> Self {
        Self {
            public_buckets,
            cache: DatasetCache::new(cache_capacity),
        }
    }

    pub(crate) fn bucket_class(&self, uri: &str) -> Result<BucketClass, ElevationError> {
        let parsed = parse_uri(uri)?;
        Ok(if self.public_buckets.contains(&parsed.bucket) {
            BucketClass::PublicUnsigned
        } else {
            BucketClass::Private
        })
    }

    fn open(&self, uri: &str) -> Result<Arc<Mutex<Dataset>>, ElevationError> {
        if let Some(cached) = self.cache.get(uri) {
            return Ok(cached);
        }

        let class = self.bucket_class(uri)?;
        let path = vsi_path(uri)?;

        // `AWS_NO_SIGN_REQUEST` is scoped to this OS thread, not set
        // process-wide: concurrent opens of a private and a public bucket
        // run on other threads of the `spawn_blocking` pool and must not
        // see each other's signing mode.
        set_thread_local_unsigned(class == BucketClass::PublicUnsigned)?;
        let dataset = Dataset::open(&path)
            .map_err(|e| ElevationError::Upstream(format!("failed to open {uri}: {e}")));
        clear_thread_local_unsigned()?;
        let dataset = dataset?;

        let handle = Arc::new(Mutex::new(dataset));
        self.cache.insert(uri.to_string(), handle.clone());
        Ok(handle)
    }

    /// `sample(FileRef, ProjectedPoint) -> Found | NotCovered | NoData |
    /// Error`. Blocking — callers must run this inside a
    /// context where blocking is acceptable (`tokio::task::spawn_blocking`
    /// in the cooperative scheduler).
    pub fn sample(
        &self,
        file: &FileRef,
        point: &ProjectedPoint,
    ) -> Result<SampleOutcome, ElevationError> {
        let expected_epsg = file.bounds_native().crs;
        let dataset_handle = self.open(&file.uri)?;
        let dataset = dataset_handle.lock().unwrap();

        let raster_epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .map(|code| code as u32);
        if let Some(raster_epsg) = raster_epsg
            && raster_epsg != expected_epsg
        {
            return Err(ElevationError::CrsMismatch {
                raster_epsg,
                expected_epsg,
            });
        }

        let geo_transform = dataset
            .geo_transform()
            .map_err(|e| ElevationError::Upstream(format!("missing geotransform: {e}")))?;
        let origin_x = geo_transform[0];
        let pixel_w = geo_transform[1];
        let origin_y = geo_transform[3];
        let pixel_h = -geo_transform[5]; // north-up convention

        let col = ((point.x - origin_x) / pixel_w).floor();
        let row = ((origin_y - point.y) / pixel_h).floor();

        let raster_size = dataset.raster_size();
        if col < 0.0 || row < 0.0 || col as usize >= raster_size.0 || row as usize >= raster_size.1 {
            return Ok(SampleOutcome::NotCovered);
        }

        let band = dataset
            .rasterband(1)
            .map_err(|e| ElevationError::Upstream(format!("no raster band: {e}")))?;
        let nodata = band.no_data_value();

        let buffer = band
            .read_as::<f64>(
                (col as isize, row as isize),
                (1, 1),
                (1, 1),
                None,
            )
            .map_err(|e| ElevationError::Upstream(format!("pixel read failed: {e}")))?;
        let value = buffer.data()[0];

        if let Some(nodata) = nodata
            && (value - nodata).abs() < f64::EPSILON
        {
            debug!(uri = %file.uri, "pixel is nodata");
            return Ok(SampleOutcome::NoData);
        }

        Ok(SampleOutcome::Found {
            elevation_m: value,
            resolution_m: pixel_w.abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsi_path_translates_s3_uri() {
        assert_eq!(
            vsi_path("s3://my-bucket/tiles/a.tif").unwrap(),
            "/vsis3/my-bucket/tiles/a.tif"
        );
    }

    #[test]
    fn rejects_non_s3_scheme() {
        assert!(vsi_path("https://example.com/a.tif").is_err());
    }

    #[test]
    fn bucket_class_is_driven_by_static_set() {
        let mut public = HashSet::new();
        public.insert("open-elevation-au".to_string());
        let sampler = RasterSampler::new(public, 16);
        assert_eq!(
            sampler.bucket_class("s3://open-elevation-au/x.tif").unwrap(),
            BucketClass::PublicUnsigned
        );
        assert_eq!(
            sampler.bucket_class("s3://road-eng-private/x.tif").unwrap(),
            BucketClass::Private
        );
    }
}
