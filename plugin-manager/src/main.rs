use anyhow::{Context, Result};
use okr_sync::auth::TokenDirectory;
use okr_sync::config::{load_config, DEFAULT_CONFIG_PATH};
use okr_sync::oauth::{OAuthClient, PendingAuthStore};
use okr_sync::plugin_config::PluginConfigStore;
use okr_sync::records::SqliteRecordStore;
use okr_sync::{Clock, SystemClock};
use plugin_manager::api::{create_router, ApiState};
use plugin_manager::plugins::builtin_plugins;
use plugin_manager::{Handshake, PluginRegistry, SyncOrchestrator, SyncScheduler};
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plugin_manager=info,okr_sync=info".into()),
        )
        .init();

    info!("Plugin Manager starting...");

    let config_path =
        std::env::var("OKR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = load_config(&config_path)?;
    config.apply_env_overrides();
    let encryption_key = config.encryption_key()?;

    info!(
        config_path = %config_path,
        database = %config.database.path,
        bind_addr = %config.server.bind_addr,
        scheduler_enabled = config.scheduler.enabled,
        "Configuration loaded"
    );

    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Stores share one SQLite file
    let config_store = Arc::new(
        PluginConfigStore::with_clock(&config.database.path, encryption_key, Arc::clone(&clock))
            .context("Failed to initialize plugin config store")?,
    );
    let record_store = Arc::new(
        SqliteRecordStore::with_clock(&config.database.path, Arc::clone(&clock))
            .context("Failed to initialize record store")?,
    );
    info!("Stores initialized");

    let oauth = OAuthClient::with_clock(config.oauth.request_timeout(), Arc::clone(&clock))
        .context("Failed to build OAuth client")?;

    let registry = Arc::new(PluginRegistry::new(config_store));
    for plugin in builtin_plugins(&config) {
        registry.register(plugin);
    }
    info!(plugins = registry.list().len(), "Plugins registered");

    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            Arc::clone(&registry),
            record_store,
            oauth.clone(),
            Arc::clone(&clock),
        )
        .with_refresh_margin(config.oauth.refresh_margin()),
    );

    let scheduler = Arc::new(
        SyncScheduler::new(orchestrator, Arc::clone(&clock))
            .with_initial_delay(config.scheduler.initial_delay()),
    );
    if config.scheduler.enabled {
        scheduler.start(config.scheduler.interval());
    } else {
        info!("Background sync disabled");
    }

    let handshake = Handshake::new(
        Arc::clone(&registry),
        PendingAuthStore::with_clock(Arc::clone(&clock)),
        oauth,
    )
    .with_ttl(config.oauth.pending_ttl());

    let users = TokenDirectory::new();
    for (token, user_id) in &config.users {
        users.insert(token, user_id);
    }
    info!(users = users.len(), "User directory loaded");

    // Start HTTP API server
    let api_state = ApiState {
        registry,
        handshake,
        scheduler: Arc::clone(&scheduler),
        users: Arc::new(users),
    };
    let router = create_router(api_state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "Plugin API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Plugin API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    scheduler.stop();
    info!("Plugin manager stopped");

    Ok(())
}
