//! C8: Source Provider — startup assembly of the spatial index, handler
//! registry, data sources, and breakers into one read-only, shared state.

use std::collections::HashSet;
use std::ffi::CString;
use std::os::raw::c_void;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::circuit_breaker::{BreakerRegistry, BreakerStore};
use crate::collections::SpatialIndexDocument;
use crate::config::AppConfig;
use crate::crs::CrsTransformer;
use crate::handlers::HandlerRegistry;
use crate::orchestrator::{ChainEntry, Orchestrator};
use crate::raster::{vsi_path, RasterSampler};
use crate::sources::{
    ApiProvider, BucketScope, HttpApiSource, ObjectStorageSource, SourceDescriptor, SourceKind,
};
use crate::spatial_index::SpatialIndex;
use crate::usage_stats::UsageStats;

/// Buckets the public unsigned mirror is known to serve from. Grows with
/// deployment, not with code — a static set rather than a discovery call.
fn public_buckets() -> HashSet<String> {
    ["open-elevation-au", "open-elevation-nz"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

const RASTER_CACHE_CAPACITY: usize = 256;
const SOURCE_IDS: [&str; 4] = ["private_bucket", "public_bucket", "http_api_a", "http_api_b"];

/// Shared, read-only application state built once at startup and handed
/// to every axum handler behind an `Arc`. Constructing one is the only
/// place in the process that performs startup I/O.
pub struct AppState {
    pub config: AppConfig,
    pub spatial_index: Arc<SpatialIndex>,
    pub orchestrator: Arc<Orchestrator>,
    pub breakers: Arc<dyn BreakerStore>,
    pub usage_stats: Arc<UsageStats>,
}

impl AppState {
    /// Fetches and validates the spatial index, builds the R-tree and
    /// handler registry, constructs every data source with its own
    /// client/credentials/timeout, registers one breaker per source, and
    /// wires them into priority order. Requests must not be served until
    /// this future resolves — there is no separate readiness flag because
    /// nothing is handed to axum until construction completes.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        if config.app_env.is_production() && config.breaker_store_url.is_none() {
            anyhow::bail!(
                "APP_ENV=production requires BREAKER_STORE_URL (a shared circuit-breaker \
                 store reachable from every instance); refusing to start with breaker state \
                 that's only visible to this process"
            );
        }

        let raw_index = load_spatial_index(&config.spatial_index_uri)
            .await
            .context("failed to fetch spatial index")?;
        let document = SpatialIndexDocument::parse(&raw_index).context("failed to parse spatial index")?;
        document.validate().context("spatial index failed validation")?;

        let collections: Vec<_> = document
            .data_collections
            .into_iter()
            .filter(|c| match c.country {
                crate::collections::Country::Au => config.enable_au,
                crate::collections::Country::Nz => config.enable_nz,
            })
            .collect();

        info!(
            collection_count = collections.len(),
            schema_version = %document.schema_version,
            "spatial index loaded"
        );

        let spatial_index = Arc::new(SpatialIndex::build(collections));
        let handlers = Arc::new(HandlerRegistry::new());
        let transformer = Arc::new(CrsTransformer::new());
        let sampler = Arc::new(RasterSampler::new(public_buckets(), RASTER_CACHE_CAPACITY));
        let usage_stats = Arc::new(UsageStats::new(SOURCE_IDS.iter().map(|s| s.to_string())));
        let breakers = Arc::new(BreakerRegistry::new());

        let http_client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let private_bucket = Arc::new(ObjectStorageSource::new(
            "private_bucket",
            BucketScope::Private,
            spatial_index.clone(),
            handlers.clone(),
            transformer.clone(),
            sampler.clone(),
        ));
        let public_bucket = Arc::new(ObjectStorageSource::new(
            "public_bucket",
            BucketScope::Public,
            spatial_index.clone(),
            handlers.clone(),
            transformer.clone(),
            sampler.clone(),
        ));
        let http_api_a = Arc::new(HttpApiSource::new(
            "http_api_a",
            http_client.clone(),
            config.http_api_a_base_url.clone(),
            config.http_api_a.api_key.clone(),
            config.http_api_a.timeout,
            config.http_api_a.daily_request_quota,
            ApiProvider::TopoData,
        ));
        let http_api_b = Arc::new(HttpApiSource::new(
            "http_api_b",
            http_client.clone(),
            config.http_api_b_base_url.clone(),
            config.http_api_b.api_key.clone(),
            config.http_api_b.timeout,
            config.http_api_b.daily_request_quota,
            ApiProvider::OpenElevation,
        ));

        // Priority order: private_bucket < public_bucket < http_api_a <
        // http_api_b — cheapest and most precise first.
        let chain = vec![
            chain_entry(
                "private_bucket",
                SourceKind::PrivateBucket,
                0,
                private_bucket,
                &config.private_bucket,
                &breakers,
            ),
            chain_entry(
                "public_bucket",
                SourceKind::PublicBucket,
                1,
                public_bucket,
                &config.public_bucket,
                &breakers,
            ),
            chain_entry(
                "http_api_a",
                SourceKind::HttpApiA,
                2,
                http_api_a,
                &config.http_api_a,
                &breakers,
            ),
            chain_entry(
                "http_api_b",
                SourceKind::HttpApiB,
                3,
                http_api_b,
                &config.http_api_b,
                &breakers,
            ),
        ];

        let orchestrator = Arc::new(Orchestrator::new(chain, usage_stats.clone()));

        Ok(Self {
            config,
            spatial_index,
            orchestrator,
            breakers,
            usage_stats,
        })
    }
}

fn chain_entry(
    id: &str,
    kind: SourceKind,
    priority: i32,
    source: Arc<dyn crate::sources::DataSource>,
    source_config: &crate::config::SourceConfig,
    breakers: &BreakerRegistry,
) -> ChainEntry {
    let breaker = breakers.register(id, source_config.failure_threshold, source_config.recovery_timeout);
    ChainEntry {
        descriptor: SourceDescriptor {
            id: id.to_string(),
            kind,
            priority,
        },
        source,
        breaker,
    }
}

async fn load_spatial_index(uri: &str) -> Result<String> {
    if let Some(s3_path) = uri.strip_prefix("s3://") {
        let uri = format!("s3://{s3_path}");
        let bytes = tokio::task::spawn_blocking(move || read_vsi_file(&vsi_path(&uri)?))
            .await
            .context("spatial index fetch task panicked")??;
        String::from_utf8(bytes).context("spatial index is not valid UTF-8")
    } else if uri.starts_with("http://") || uri.starts_with("https://") {
        reqwest::get(uri)
            .await
            .context("failed to GET spatial index")?
            .text()
            .await
            .context("failed to read spatial index response body")
    } else {
        tokio::fs::read_to_string(uri)
            .await
            .with_context(|| format!("failed to read spatial index at {uri}"))
    }
}

/// Reads an entire file through GDAL's VSI layer, the same mechanism C4
/// uses for raster tiles, so a `s3://` spatial index URI is fetched with
/// the same credentials and retry behaviour as everything else this
/// process reads from object storage.
fn read_vsi_file(vsi_path: &str) -> Result<Vec<u8>, crate::error::ElevationError> {
    use crate::error::ElevationError;

    let c_path = CString::new(vsi_path)
        .map_err(|e| ElevationError::Internal(format!("invalid VSI path: {e}")))?;
    let mode = CString::new("rb").unwrap();

    unsafe {
        let handle = gdal_sys::VSIFOpenL(c_path.as_ptr(), mode.as_ptr());
        if handle.is_null() {
            return Err(ElevationError::Upstream(format!(
                "failed to open {vsi_path}"
            )));
        }

        gdal_sys::VSIFSeekL(handle, 0, 2);
        let size = gdal_sys::VSIFTellL(handle);
        gdal_sys::VSIFSeekL(handle, 0, 0);

        let mut buffer = vec![0u8; size as usize];
        let read = gdal_sys::VSIFReadL(buffer.as_mut_ptr() as *mut c_void, 1, size as usize, handle);
        gdal_sys::VSIFCloseL(handle);

        if read != size as usize {
            return Err(ElevationError::Upstream(format!(
                "short read fetching {vsi_path}: expected {size} bytes, got {read}"
            )));
        }
        Ok(buffer)
    }
}
