mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod router;
mod state;

use crate::config::GatewayConfig;
use router::create_router;
use state::AppState;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = GatewayConfig::load()?;
    init_tracing(&config.log_level);

    tracing::info!(ledger_mode = ?config.ledger_mode, "Starting exchange gateway");

    let state = AppState::from_config(&config).await?;
    tracing::info!(identity = %state.orchestrator.identity(), "Signing identity ready");

    let app = create_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
