//! Object-storage-backed sources: private bucket and public unsigned
//! bucket. Both run the same C1->C2->C3->C4 pipeline; they differ only in
//! which bucket class of file they're willing to read, so one struct
//! serves both, parameterised by `BucketScope`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::crs::CrsTransformer;
use crate::error::ElevationError;
use crate::geometry::QueryPoint;
use crate::handlers::HandlerRegistry;
use crate::raster::{BucketClass, RasterSampler, SampleOutcome};
use crate::spatial_index::SpatialIndex;

use super::{Coverage, DataSource, ElevationOutcome, HealthStatus, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketScope {
    Private,
    Public,
}

impl BucketScope {
    fn matches(self, class: BucketClass) -> bool {
        matches!(
            (self, class),
            (BucketScope::Private, BucketClass::Private)
                | (BucketScope::Public, BucketClass::PublicUnsigned)
        )
    }
}

pub struct ObjectStorageSource {
    id: SourceId,
    scope: BucketScope,
    spatial_index: Arc<SpatialIndex>,
    handlers: Arc<HandlerRegistry>,
    transformer: Arc<CrsTransformer>,
    sampler: Arc<RasterSampler>,
}

impl ObjectStorageSource {
    pub fn new(
        id: impl Into<SourceId>,
        scope: BucketScope,
        spatial_index: Arc<SpatialIndex>,
        handlers: Arc<HandlerRegistry>,
        transformer: Arc<CrsTransformer>,
        sampler: Arc<RasterSampler>,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            spatial_index,
            handlers,
            transformer,
            sampler,
        }
    }
}

#[async_trait]
impl DataSource for ObjectStorageSource {
    async fn get_elevation(&self, query_point: &QueryPoint) -> ElevationOutcome {
        let candidates = self.spatial_index.candidates(query_point);
        if candidates.is_empty() {
            return ElevationOutcome::NotCovered;
        }

        let ordered = self.handlers.prioritise_all(candidates);
        let mut saw_nodata = false;

        for collection in ordered {
            let Some(handler) = self.handlers.for_country(collection.country) else {
                continue;
            };
            let files = match handler.files(collection, query_point, &self.spatial_index, &self.transformer) {
                Ok(files) => files,
                Err(error) => {
                    return ElevationOutcome::Error {
                        source_id: self.id.clone(),
                        error,
                    };
                }
            };

            for file in files {
                let class = match self.sampler.bucket_class(&file.uri) {
                    Ok(class) => class,
                    Err(error) => {
                        warn!(uri = %file.uri, %error, "could not classify file bucket");
                        continue;
                    }
                };
                if !self.scope.matches(class) {
                    continue;
                }

                let projected = match query_point.projected(collection.native_crs, &self.transformer) {
                    Ok(p) => p,
                    Err(error) => {
                        return ElevationOutcome::Error {
                            source_id: self.id.clone(),
                            error,
                        };
                    }
                };

                let sampler = self.sampler.clone();
                let file = file.clone();
                let outcome = tokio::task::spawn_blocking(move || sampler.sample(&file, &projected))
                    .await
                    .unwrap_or_else(|join_error| {
                        Err(ElevationError::Internal(format!(
                            "raster sampling task panicked: {join_error}"
                        )))
                    });

                match outcome {
                    Ok(SampleOutcome::Found {
                        elevation_m,
                        resolution_m,
                    }) => {
                        return ElevationOutcome::Found {
                            elevation_m,
                            source_id: self.id.clone(),
                            resolution_m,
                            data_type: collection.data_type,
                            message: None,
                        };
                    }
                    Ok(SampleOutcome::NotCovered) => continue,
                    Ok(SampleOutcome::NoData) => {
                        saw_nodata = true;
                        continue;
                    }
                    Err(error) => {
                        return ElevationOutcome::Error {
                            source_id: self.id.clone(),
                            error,
                        };
                    }
                }
            }
        }

        if saw_nodata {
            ElevationOutcome::NoData {
                source_id: self.id.clone(),
            }
        } else {
            ElevationOutcome::NotCovered
        }
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            ok: true,
            detail: format!("{} collections indexed", self.spatial_index.len()),
        }
    }

    fn coverage(&self) -> Coverage {
        Coverage {
            description: match self.scope {
                BucketScope::Private => "private object storage (AU/NZ survey campaigns)".to_string(),
                BucketScope::Public => "public unsigned object storage mirror".to_string(),
            },
            bbox: None,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}
