//! RSTUF API Server Binary
//!
//! Runs the control-plane HTTP server. All configuration comes from the
//! environment; see [`rstuf_api::ApiConfig`].

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use rstuf_api::broker::Broker;
use rstuf_api::settings::SettingsBackend;
use rstuf_api::{
    create_router, ApiConfig, AppState, LocalMirror, MemoryBroker, MemorySettings, SettingsStore,
};
use rstuf_auth::{AuthService, AuthStore, AuthenticationService};

#[tokio::main]
async fn main() {
    // Configuration
    let config = ApiConfig::from_env().expect("Invalid configuration");

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Settings store
    let backend = settings_backend(&config).await;
    let mirror = LocalMirror::new(config.settings_file());
    let settings = Arc::new(
        SettingsStore::open(backend, Some(mirror))
            .await
            .expect("Failed to open settings store"),
    );

    // Task broker
    let broker = task_broker(&config).await;

    // Authentication
    let auth = authentication(&config).await;
    if !config.auth {
        warn!("Authentication is disabled; every endpoint is open");
    }

    info!(
        port = config.port,
        auth = config.auth,
        data_dir = %config.data_dir.display(),
        "Starting RSTUF API server"
    );

    // Create application state
    let state = Arc::new(AppState::new(
        settings,
        broker,
        auth,
        config.auth,
        config.bootstrap_poll_interval,
    ));

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "RSTUF API listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

#[cfg(feature = "redis")]
async fn settings_backend(config: &ApiConfig) -> Arc<dyn SettingsBackend> {
    match config.redis_url(config.redis_db_data) {
        Some(url) => Arc::new(
            rstuf_api::settings::RedisSettings::connect(&url)
                .await
                .expect("Failed to connect to Redis settings store"),
        ),
        None => {
            warn!("RSTUF_REDIS_SERVER not set; settings are kept in memory");
            Arc::new(MemorySettings::new())
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn settings_backend(_config: &ApiConfig) -> Arc<dyn SettingsBackend> {
    Arc::new(MemorySettings::new())
}

#[cfg(feature = "redis")]
async fn task_broker(config: &ApiConfig) -> Arc<dyn Broker> {
    match &config.broker_server {
        Some(broker_url) => {
            let result_url = config
                .redis_url(config.redis_db_result)
                .unwrap_or_else(|| broker_url.clone());
            Arc::new(
                rstuf_api::broker::RedisBroker::connect(broker_url, &result_url)
                    .await
                    .expect("Failed to connect to task broker"),
            )
        }
        None => {
            warn!("RSTUF_BROKER_SERVER not set; tasks are queued in memory and never run");
            Arc::new(MemoryBroker::new())
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn task_broker(_config: &ApiConfig) -> Arc<dyn Broker> {
    Arc::new(MemoryBroker::new())
}

#[cfg(feature = "sqlite")]
async fn auth_store(config: &ApiConfig) -> Arc<dyn AuthStore> {
    Arc::new(
        rstuf_auth::SqliteAuthStore::new(&config.database_url)
            .await
            .expect("Failed to open user database"),
    )
}

#[cfg(not(feature = "sqlite"))]
async fn auth_store(_config: &ApiConfig) -> Arc<dyn AuthStore> {
    Arc::new(rstuf_auth::MemoryAuthStore::new())
}

/// `None` when no token secret is configured (only possible with auth off)
async fn authentication(config: &ApiConfig) -> Option<Arc<dyn AuthenticationService>> {
    if config.token_key.is_none() {
        return None;
    }

    let store = auth_store(config).await;
    let service = AuthService::new(
        store,
        config.token_key.clone(),
        config.admin_password.clone(),
    )
    .expect("Failed to initialize authentication");

    if config.admin_password.is_some() {
        service
            .bootstrap_admin()
            .await
            .expect("Failed to create admin user");
    }
    Some(Arc::new(service))
}
