//! Structured logging setup. `RUST_LOG` controls verbosity; defaults to
//! `info` for this crate and `warn` for its dependencies.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,terra_elevate=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
