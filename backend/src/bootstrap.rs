use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    autotopup::{PolicyStore, TopUpWorker},
    cache::TtlCache,
    chain::{AccountQuery, PocketClient, PocketdExecutor, TxExecutor},
    config::{ApplicationRegistry, Config},
    error::AppResult,
};

/// `config_path` is where newly staked applications get written back to
pub async fn initialize_app_state(config: Config, config_path: Option<PathBuf>) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let config = Arc::new(config);
    info!("✅ Configuration loaded: networks {:?}", config.network_names());

    let applications = Arc::new(ApplicationRegistry::new(&config, config_path));

    // Chain access
    let query: Arc<dyn AccountQuery> = Arc::new(PocketClient::new()?);
    let executor: Arc<dyn TxExecutor> = Arc::new(PocketdExecutor::new(&config, query.clone()));

    if executor.is_available().await {
        info!("✅ {} found, transactions enabled", config.pocketd_binary);
    } else {
        warn!(
            "⚠️  {} not found in PATH - fund/upstake will fail until it is installed",
            config.pocketd_binary
        );
    }

    // Read caches, one entry per network
    let app_cache = Arc::new(TtlCache::new(config.cache_ttl()));
    let bank_cache = Arc::new(TtlCache::new(config.cache_ttl()));
    info!("✅ Caches initialized (ttl {:?})", config.cache_ttl());

    // Policy store; an unreadable file aborts startup
    let store_path = std::env::var("AUTOTOPUP_STORE_PATH")
        .unwrap_or_else(|_| config.autotopup.store_path.clone());
    let store = Arc::new(PolicyStore::open(&store_path)?);
    info!("✅ Auto-top-up store opened at {}", store.path().display());

    let settings = &config.autotopup;
    let worker = Arc::new(
        TopUpWorker::new(
            store.clone(),
            config.clone(),
            query.clone(),
            executor.clone(),
            app_cache.clone(),
            bank_cache.clone(),
        )
        .with_poll_policy(settings.poll_policy())
        .with_call_timeout(settings.call_timeout())
        .with_event_capacity(settings.event_capacity),
    );
    info!("✅ Auto-top-up worker ready (every {:?})", settings.interval());

    info!("✓ All components initialized");

    Ok(AppState {
        config,
        applications,
        query,
        executor,
        app_cache,
        bank_cache,
        store,
        worker,
    })
}
