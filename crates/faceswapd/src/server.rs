//! HTTP surface: the swap endpoint, the browser page and artifact serving.

use crate::config::Config;
use crate::handlers;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use faceswap_core::types::SWAP_ENDPOINT;
use faceswap_core::{SharedStorage, SwapCommand};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Read-only state shared by all requests.
pub struct AppState {
    pub storage: SharedStorage,
    pub command: SwapCommand,
    pub output_extension: String,
    pub verify_output: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage: SharedStorage::new(&config.storage_dir, &config.public_prefix),
            command: SwapCommand::new(&config.command, config.command_args.clone())
                .with_timeout(config.process_timeout()),
            output_extension: config.output_extension.clone(),
            verify_output: config.verify_output,
        }
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let artifacts = ServeDir::new(state.storage.root());
    let public_prefix = state.storage.public_prefix().to_string();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(
            SWAP_ENDPOINT,
            post(handlers::face_swap).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .nest_service(&public_prefix, artifacts)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn run(config: &Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "faceswapd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("faceswapd shutting down");
}
