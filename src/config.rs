//! Configuration as pure data.
//!
//! Configuration is loaded once, in `main`, and passed by value into every
//! constructor. Nothing that loads a raster, fetches the spatial index, or
//! opens a client lives on `AppConfig` itself — avoiding a circular graph of
//! config depending on I/O depending on config.

use std::env;
use std::time::Duration;

/// `app_env` gates fail-fast vs in-memory fallback for the circuit-breaker
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Production,
    Development,
}

impl AppEnv {
    fn from_env() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") => AppEnv::Production,
            _ => AppEnv::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, AppEnv::Production)
    }
}

/// Per-source tuning: `api_key`, `timeout_ms`, `daily_request_quota`,
/// `failure_threshold`, `recovery_timeout_ms`.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub api_key: Option<String>,
    pub daily_request_quota: Option<u64>,
}

impl SourceConfig {
    fn from_env(prefix: &str, default_timeout: Duration) -> Self {
        let timeout_ms = env_var_parsed(&format!("{prefix}_TIMEOUT_MS"))
            .unwrap_or(default_timeout.as_millis() as u64);
        let failure_threshold =
            env_var_parsed(&format!("{prefix}_FAILURE_THRESHOLD")).unwrap_or(3);
        let recovery_timeout_ms =
            env_var_parsed(&format!("{prefix}_RECOVERY_TIMEOUT_MS")).unwrap_or(30_000);

        Self {
            timeout: Duration::from_millis(timeout_ms),
            failure_threshold,
            recovery_timeout: Duration::from_millis(recovery_timeout_ms),
            api_key: env::var(format!("{prefix}_API_KEY")).ok(),
            daily_request_quota: env_var_parsed(&format!("{prefix}_DAILY_REQUEST_QUOTA")),
        }
    }
}

fn env_var_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Top-level application configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: AppEnv,
    pub spatial_index_uri: String,
    pub enable_au: bool,
    pub enable_nz: bool,
    pub bind_addr: std::net::SocketAddr,
    pub max_batch_size: usize,
    pub batch_concurrency: usize,
    pub private_bucket: SourceConfig,
    pub public_bucket: SourceConfig,
    pub http_api_a: SourceConfig,
    pub http_api_b: SourceConfig,
    pub http_api_a_base_url: String,
    pub http_api_b_base_url: String,
    /// Connection string for a shared circuit-breaker store (e.g. a Redis
    /// URL). `None` means breaker state is in-memory and process-local;
    /// required in production (see `AppState::bootstrap`).
    pub breaker_store_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment. Pure aside from
    /// reading env vars — no network, filesystem, or PROJ/GDAL calls here.
    pub fn from_env() -> Self {
        Self {
            app_env: AppEnv::from_env(),
            spatial_index_uri: env::var("SPATIAL_INDEX_URI")
                .unwrap_or_else(|_| "./spatial_index.json".to_string()),
            enable_au: env_var_parsed("ENABLE_COUNTRY_AU").unwrap_or(true),
            enable_nz: env_var_parsed("ENABLE_COUNTRY_NZ").unwrap_or(true),
            bind_addr: env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| "0.0.0.0:8080".parse().unwrap()),
            max_batch_size: env_var_parsed("MAX_BATCH_SIZE").unwrap_or(500),
            batch_concurrency: env_var_parsed("BATCH_CONCURRENCY").unwrap_or(12),
            private_bucket: SourceConfig::from_env("PRIVATE_BUCKET", Duration::from_secs(2)),
            public_bucket: SourceConfig::from_env("PUBLIC_BUCKET", Duration::from_secs(2)),
            http_api_a: SourceConfig::from_env("HTTP_API_A", Duration::from_secs(8)),
            http_api_b: SourceConfig::from_env("HTTP_API_B", Duration::from_secs(15)),
            http_api_a_base_url: env::var("HTTP_API_A_BASE_URL")
                .unwrap_or_else(|_| "https://api.opentopodata.org/v1/srtm90m".to_string()),
            http_api_b_base_url: env::var("HTTP_API_B_BASE_URL")
                .unwrap_or_else(|_| "https://api.open-elevation.com/api/v1/lookup".to_string()),
            breaker_store_url: env::var("BREAKER_STORE_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_are_sane_without_env() {
        unsafe {
            for key in [
                "APP_ENV",
                "SPATIAL_INDEX_URI",
                "MAX_BATCH_SIZE",
                "BATCH_CONCURRENCY",
                "BREAKER_STORE_URL",
            ] {
                env::remove_var(key);
            }
        }
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.app_env, AppEnv::Development);
        assert_eq!(cfg.max_batch_size, 500);
        assert_eq!(cfg.batch_concurrency, 12);
        assert_eq!(cfg.breaker_store_url, None);
    }

    #[test]
    #[serial]
    fn production_is_recognised() {
        unsafe {
            env::set_var("APP_ENV", "production");
        }
        assert!(AppConfig::from_env().app_env.is_production());
        unsafe {
            env::remove_var("APP_ENV");
        }
    }
}
