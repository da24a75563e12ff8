use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    api::handler::{
        delete_policy, fund_application, get_application, get_bank, get_config, health_check,
        list_applications, list_events, list_networks, list_policies, list_services, set_policy,
        stake_application, trigger_cycle, upstake_application, AppState,
    },
    middleware::{create_cors_layer, security_headers},
};

/// Request bodies are tiny JSON objects
const MAX_BODY_BYTES: usize = 1024;

pub async fn create_app(state: AppState, port: u16) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let api = Router::new()
        .route("/networks", get(list_networks))
        .route("/config", get(get_config))
        .route("/services", get(list_services))
        // Applications
        .route("/applications", get(list_applications))
        .route("/applications/stake", post(stake_application))
        .route("/applications/:address", get(get_application))
        .route("/applications/:address/fund", post(fund_application))
        .route("/applications/:address/upstake", post(upstake_application))
        .route(
            "/applications/:address/autotopup",
            put(set_policy).delete(delete_policy),
        )
        .route("/bank", get(get_bank))
        // Auto-top-up
        .route("/autotopup", get(list_policies))
        .route("/autotopup/events", get(list_events))
        .route("/autotopup/run", post(trigger_cycle));

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(create_cors_layer(port))
        // Add request tracing
        .layer(TraceLayer::new_for_http());

    let app = security_headers(app).with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server<F>(
    app: Router,
    bind_address: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("👋 Server stopped");
    Ok(())
}
