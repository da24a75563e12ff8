mod api;
mod autotopup;
mod bootstrap;
mod cache;
mod chain;
mod config;
mod error;
mod middleware;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::autotopup::{TopUpScheduler, TopUpWorker};
use crate::config::Config;

const DEFAULT_PORT: u16 = 9999;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on SIGINT or SIGTERM, after telling the worker to stop
async fn shutdown_signal(worker: Arc<TopUpWorker>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
    worker.shutdown();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    init_tracing();

    info!("🚀 Starting Pocket application dashboard");

    // Load configuration
    dotenv::dotenv().ok();
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| format!("0.0.0.0:{}", DEFAULT_PORT));
    let port = bind_address
        .parse::<SocketAddr>()
        .map(|addr| addr.port())
        .unwrap_or(DEFAULT_PORT);

    let config = Config::load(&config_path)?;
    info!("📄 Configuration read from {}", config_path);

    let state = bootstrap::initialize_app_state(config, Some(config_path.into())).await?;

    // Background auto-top-up
    let scheduler = TopUpScheduler::new(state.worker.clone(), state.config.autotopup.interval());
    let scheduler_handle = scheduler.start();

    // Create HTTP server
    let app = server::create_app(state.clone(), port).await;

    // Run the Server
    server::run_server(app, &bind_address, shutdown_signal(state.worker.clone())).await?;

    if let Err(e) = scheduler_handle.await {
        error!("❌ Scheduler task failed: {}", e);
    }

    info!("✓ Shutdown complete");

    Ok(())
}
