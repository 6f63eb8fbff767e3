use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;
mod server;
mod sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceswapd starting");

    let config = config::Config::load()?;
    let state = Arc::new(server::AppState::from_config(&config));

    // Fail fast if the shared storage location is unusable.
    state.storage.ensure_root()?;
    tracing::info!(
        storage = %config.storage_dir.display(),
        command = %config.command,
        args = ?config.command_args,
        "configuration loaded"
    );

    match config.retention() {
        Some(retention) => sweeper::spawn(
            state.storage.clone(),
            retention,
            Duration::from_secs(config.sweep_interval_secs.max(1)),
        ),
        None => tracing::warn!("no retention configured; stored files are never deleted"),
    }

    server::run(&config, state).await
}
