use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::web::WebServerState;

mod config;
mod controller;
mod error;
mod presentation;
mod stream_session;
mod telemetry;
mod transport;
mod types;
mod web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eprintln!("🚀 Starting dashcam live view server...");

    eprintln!("🔧 Initializing telemetry...");
    telemetry::init_telemetry();

    eprintln!("🔧 Loading configuration...");
    let config = AppConfig::load("config.json")?;
    info!("⚙️ Configuration loaded: {:?}", config);

    let state = Arc::new(WebServerState::new(config));
    let visits = state.visits.clone();

    eprintln!("🔧 Starting web server...");
    let web_handle = tokio::spawn(async move {
        info!("🔧 Web server task started");
        if let Err(e) = web::start_web_server(state).await {
            error!("Web server failed: {}", e);
        }
    });

    tokio::select! {
        result = web_handle => {
            if let Err(e) = result {
                error!("❌ Web server task failed: {:?}", e);
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown requested");
        }
    }

    web::close_all_visits(&visits).await;

    eprintln!("🛑 Server shutdown complete");
    info!("🛑 Server shutdown complete");
    Ok(())
}
