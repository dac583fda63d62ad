//! C6: Data Sources — uniform capability over private bucket, public
//! bucket, and two HTTP elevation APIs. Each wraps C1-C4 or an HTTP
//! client behind the same trait so C7 can treat them identically.

mod http_api;
mod object_storage;

use async_trait::async_trait;

use crate::collections::DataType;
use crate::error::ElevationError;
use crate::geometry::{BoundingBox, QueryPoint};

pub use http_api::{ApiProvider, HttpApiSource};
pub use object_storage::BucketScope;
pub use object_storage::ObjectStorageSource;

pub type SourceId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    PrivateBucket,
    PublicBucket,
    HttpApiA,
    HttpApiB,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::PrivateBucket => "private_bucket",
            SourceKind::PublicBucket => "public_bucket",
            SourceKind::HttpApiA => "http_api_a",
            SourceKind::HttpApiB => "http_api_b",
        }
    }
}

/// `{id, kind, priority}`. Priority orders the fallback chain at
/// construction time only; it plays no further role at request time.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub kind: SourceKind,
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct Coverage {
    pub description: String,
    pub bbox: Option<BoundingBox>,
}

/// Sum type returned by a source. Only bugs raise — coverage gaps and
/// nodata are first-class outcomes, not exceptions, so the orchestrator
/// never has to distinguish "no data" from "crashed" by catching.
#[derive(Debug, Clone)]
pub enum ElevationOutcome {
    Found {
        elevation_m: f64,
        source_id: SourceId,
        resolution_m: f64,
        data_type: DataType,
        message: Option<String>,
    },
    NotCovered,
    NoData {
        source_id: SourceId,
    },
    Error {
        source_id: SourceId,
        error: ElevationError,
    },
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_elevation(&self, query_point: &QueryPoint) -> ElevationOutcome;
    async fn health(&self) -> HealthStatus;
    fn coverage(&self) -> Coverage;
    fn id(&self) -> &str;
}
