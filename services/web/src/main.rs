use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use common::config::AppConfig;
use common::telemetry::init_tracing;
use web::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;

    info!("Starting membership web front end");

    let config = AppConfig::load()?;
    let state = AppState::from_config(&config)?;

    // Restore any persisted session before the first request is served
    state.auth.mount().await;

    let app = create_router(state.clone());

    let listener = TcpListener::bind(&config.web.bind_address).await?;
    info!("Listening on {}", config.web.bind_address);

    axum::serve(listener, app).await?;

    state.auth.unmount().await;
    Ok(())
}
