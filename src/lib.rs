//! Bi-national (AU/NZ) elevation lookup service.
//!
//! Requests enter through [`web`], are answered by the fallback chain
//! in [`orchestrator`] over sources built in [`provider`], and the
//! underlying raster/geometry/CRS plumbing lives in [`raster`],
//! [`geometry`], and [`crs`].

pub mod batch;
pub mod circuit_breaker;
pub mod collections;
pub mod config;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod raster;
pub mod sources;
pub mod spatial_index;
pub mod telemetry;
pub mod usage_stats;
pub mod web;

pub use config::AppConfig;
pub use error::ElevationError;
pub use provider::AppState;
