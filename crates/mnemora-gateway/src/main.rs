use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod error;
mod http;
mod orchestrator;
mod scoring;
mod tools;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mnemora_core::logging::init_tracing("mnemora_gateway=info,tower_http=debug");

    let config_path = std::env::var("MNEMORA_CONFIG").ok();
    let config = mnemora_core::config::MnemoraConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        mnemora_core::config::MnemoraConfig::default()
    });

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(config)?);
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("Mnemora gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
