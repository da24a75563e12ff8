use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::models::*;
use crate::{
    autotopup::{models::PolicyMap, PolicyStore, TopUpEvent, TopUpPolicy, TopUpWorker},
    cache::TtlCache,
    chain::{AccountQuery, Application, BankAccount, NetworkRef, Service, TxExecutor, TxOutcome},
    config::{ApplicationRegistry, Config},
    error::{AppError, AppResult, ChainError, ChainResult},
    middleware::validation::{pokt_to_upokt, validate_address, validate_body, validate_service_id},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub applications: Arc<ApplicationRegistry>,
    pub query: Arc<dyn AccountQuery>,
    pub executor: Arc<dyn TxExecutor>,
    pub app_cache: Arc<TtlCache<Vec<Application>>>,
    pub bank_cache: Arc<TtlCache<BankAccount>>,
    pub store: Arc<PolicyStore>,
    pub worker: Arc<TopUpWorker>,
}

impl AppState {
    fn network<'a>(&'a self, query: &'a NetworkQuery) -> AppResult<NetworkRef<'a>> {
        validate_body(query)?;
        let name = query.network();
        self.config
            .network(name)
            .map(|config| NetworkRef::new(name, config))
            .ok_or_else(|| {
                warn!("⚠️ Invalid network requested: {}", name);
                AppError::UnknownNetwork(name.to_string())
            })
    }

    fn invalidate(&self, network: &str) {
        self.app_cache.delete(network);
        self.bank_cache.delete(network);
    }

    /// Manual transactions get the same per-call limit as the worker
    async fn timed<T>(&self, call: impl Future<Output = ChainResult<T>>) -> AppResult<T> {
        let limit = self.config.autotopup.call_timeout();
        let outcome = tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ChainError::Timeout(limit))??;
        Ok(outcome)
    }
}

fn checked_address(address: &str) -> AppResult<()> {
    validate_address(address).map_err(|_| AppError::InvalidAddress(address.to_string()))
}

/// GET /health - 503 when the transaction CLI can't be found
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let networks = state.config.networks.len();

    if state.executor.is_available().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                pocketd: "available".to_string(),
                networks,
                error: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                pocketd: "missing".to_string(),
                networks,
                error: Some(format!("{} not found in PATH", state.config.pocketd_binary)),
            }),
        )
    }
}

/// GET /api/networks
pub async fn list_networks(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.config.network_names())
}

/// GET /api/config - thresholds only, endpoints and addresses stay private
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        thresholds: state.config.thresholds,
    })
}

/// GET /api/applications?network=&refresh=
pub async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<Vec<Application>>> {
    let network = state.network(&query)?;

    if !query.refresh {
        if let Some(apps) = state.app_cache.get(network.name) {
            info!("📦 Returning {} cached applications for {}", apps.len(), network.name);
            return Ok(Json(apps));
        }
    }

    let addresses = state.applications.addresses(network.name);
    info!("🔍 Querying {} applications on {}", addresses.len(), network.name);

    let results = join_all(
        addresses
            .iter()
            .map(|address| state.query.application(network, address)),
    )
    .await;

    let applications: Vec<Application> = results
        .into_iter()
        .zip(&addresses)
        .filter_map(|(result, address)| match result {
            Ok(app) => Some(app),
            Err(e) => {
                error!("❌ Failed to query application {}: {}", address, e);
                None
            }
        })
        .collect();

    state.app_cache.set(network.name, applications.clone());

    info!(
        "✓ Fetched {}/{} applications for {}",
        applications.len(),
        addresses.len(),
        network.name
    );
    Ok(Json(applications))
}

/// GET /api/applications/:address?network=
pub async fn get_application(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<Application>> {
    checked_address(&address)?;
    let network = state.network(&query)?;

    info!("🔍 Fetching application {} on {}", address, network.name);
    let app = state.query.application(network, &address).await?;
    Ok(Json(app))
}

/// GET /api/bank?network=&refresh=
pub async fn get_bank(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<BankAccount>> {
    let network = state.network(&query)?;

    if network.config.bank.is_empty() {
        return Err(AppError::InvalidInput(
            "no bank account configured for network".to_string(),
        ));
    }

    if !query.refresh {
        if let Some(bank) = state.bank_cache.get(network.name) {
            info!("📦 Returning cached bank account for {}", network.name);
            return Ok(Json(bank));
        }
    }

    let bank = state.query.bank_account(network, &network.config.bank).await?;
    state.bank_cache.set(network.name, bank.clone());

    Ok(Json(bank))
}

/// POST /api/applications/:address/fund - send POKT from the bank
pub async fn fund_application(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<NetworkQuery>,
    Json(request): Json<AmountRequest>,
) -> AppResult<Json<TxOutcome>> {
    checked_address(&address)?;
    let network = state.network(&query)?;
    let amount = pokt_to_upokt(request.amount)?;

    info!("💸 Manual fund of {} ({} upokt) to {} on {}", request.amount, amount, address, network.name);

    let outcome = state.timed(state.executor.fund(network, &address, amount)).await?;
    if outcome.success {
        state.invalidate(network.name);
    } else {
        warn!("⚠️ Fund to {} rejected: {:?}", address, outcome.message);
    }

    Ok(Json(outcome))
}

/// POST /api/applications/:address/upstake - raise the stake by `amount` POKT
pub async fn upstake_application(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<NetworkQuery>,
    Json(request): Json<AmountRequest>,
) -> AppResult<Json<TxOutcome>> {
    checked_address(&address)?;
    let network = state.network(&query)?;
    let amount = pokt_to_upokt(request.amount)?;

    info!("📈 Manual upstake of {} ({} upokt) for {} on {}", request.amount, amount, address, network.name);

    let outcome = state.timed(state.executor.upstake(network, &address, amount)).await?;
    if outcome.success {
        state.invalidate(network.name);
    } else {
        warn!("⚠️ Upstake for {} rejected: {:?}", address, outcome.message);
    }

    Ok(Json(outcome))
}

/// POST /api/applications/stake?network= - stake a new application and track it
pub async fn stake_application(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
    Json(request): Json<NewStakeRequest>,
) -> AppResult<Json<TxOutcome>> {
    checked_address(&request.address)?;
    validate_service_id(&request.service_id)?;
    let network = state.network(&query)?;
    let amount = pokt_to_upokt(request.amount)?;

    info!(
        "🆕 Manual stake of {} ({} upokt) for {} on service {} ({})",
        request.amount, amount, request.address, request.service_id, network.name
    );

    let outcome = state
        .timed(
            state
                .executor
                .stake_new(network, &request.address, &request.service_id, amount),
        )
        .await?;

    if outcome.success {
        match state.applications.add(network.name, &request.address) {
            Ok(()) => {
                if let Err(e) = state.applications.persist(network.name, &request.address) {
                    error!("❌ Failed to save {} to the config file: {}", request.address, e);
                }
            }
            Err(e) => warn!("⚠️ Not tracking {}: {}", request.address, e),
        }
    } else {
        warn!("⚠️ Stake for {} rejected: {:?}", request.address, outcome.message);
    }
    state.invalidate(network.name);

    Ok(Json(outcome))
}

/// GET /api/services?network=
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<Vec<Service>>> {
    let network = state.network(&query)?;

    let services = state.query.services(network).await?;
    info!("✓ {} services registered on {}", services.len(), network.name);

    Ok(Json(services))
}

/// GET /api/autotopup?network= - policies keyed by address, amounts in upokt
pub async fn list_policies(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<PolicyMap>> {
    validate_body(&query)?;
    Ok(Json(state.store.get_all(query.network())))
}

/// PUT /api/applications/:address/autotopup?network=
pub async fn set_policy(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<NetworkQuery>,
    Json(request): Json<PolicyRequest>,
) -> AppResult<Json<PolicyResponse>> {
    checked_address(&address)?;
    let network = state.network(&query)?;

    let trigger_threshold = pokt_to_upokt(request.trigger_threshold)
        .map_err(|e| AppError::InvalidInput(format!("invalid trigger threshold: {}", e)))?;
    let target_amount = pokt_to_upokt(request.target_amount)
        .map_err(|e| AppError::InvalidInput(format!("invalid target amount: {}", e)))?;

    let policy = TopUpPolicy {
        enabled: request.enabled,
        trigger_threshold,
        target_amount,
    };
    state.store.set(network.name, &address, policy)?;

    info!(
        "✅ Auto-top-up policy saved for {} on {} (enabled: {})",
        address, network.name, policy.enabled
    );

    Ok(Json(PolicyResponse {
        network: network.name.to_string(),
        address,
        policy,
    }))
}

/// DELETE /api/applications/:address/autotopup?network=
pub async fn delete_policy(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> AppResult<Json<StatusResponse>> {
    checked_address(&address)?;
    validate_body(&query)?;
    let network = query.network();

    state.store.delete(network, &address)?;
    info!("🗑️ Auto-top-up policy deleted for {} on {}", address, network);

    Ok(Json(StatusResponse::new("deleted")))
}

/// GET /api/autotopup/events - newest last
pub async fn list_events(State(state): State<AppState>) -> Json<Vec<TopUpEvent>> {
    Json(state.worker.recent_events())
}

/// POST /api/autotopup/run - start a cycle in the background
pub async fn trigger_cycle(State(state): State<AppState>) -> (StatusCode, Json<StatusResponse>) {
    info!("🔄 Manual auto-top-up cycle requested");

    if state.worker.try_start() {
        (StatusCode::ACCEPTED, Json(StatusResponse::new("started")))
    } else {
        (StatusCode::CONFLICT, Json(StatusResponse::new("already_running")))
    }
}
