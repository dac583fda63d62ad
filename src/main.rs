#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use terra_elevate::{web, AppConfig, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    terra_elevate::telemetry::init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr;

    let metrics_handle = terra_elevate::metrics::init_metrics();

    let state = match AppState::bootstrap(config).await {
        Ok(state) => Arc::new(state),
        Err(error) => {
            error!(%error, "failed to bootstrap application state");
            std::process::exit(1);
        }
    };

    info!(
        collection_count = state.spatial_index.len(),
        "elevation service ready"
    );

    let app = web::build_router(state, metrics_handle);

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, %bind_addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%error, "server exited with error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(error) => error!(%error, "failed to install ctrl-c handler"),
    }
}
