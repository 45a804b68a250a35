use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bracketeer_core::{
    create_authenticator, load_config, validate_config, Authenticator, Broadcaster,
    EnhancementProvider, Environment, HttpBroadcaster, HttpObjectStore, HttpProvider,
    ObjectStore, Orchestrator, OrderStore, SqliteOrderStore,
};
use bracketeer_server::api::create_router;
use bracketeer_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet when the config is unreadable.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Plain text logs in development, JSON lines in production.
fn init_tracing(environment: Environment) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match environment {
        Environment::Production => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        Environment::Development => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("BRACKETEER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(config.server.environment);
    info!(version = VERSION, config = ?config_path, "Starting bracketeer");

    // Validate configuration
    validate_config(&config).context("Invalid configuration")?;

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Authentication method: {}", authenticator.method_name());
    if authenticator.method_name() == "none" && config.server.environment == Environment::Production
    {
        warn!("Authentication is disabled in production; every caller is the development user");
    }

    // Initialize order store
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {:?}", parent)
            })?;
        }
    }
    let store: Arc<dyn OrderStore> = Arc::new(
        SqliteOrderStore::new(&config.database.path).with_context(|| {
            format!("Failed to open database at {:?}", config.database.path)
        })?,
    );
    info!("Order store initialized at {:?}", config.database.path);

    // External collaborators
    let provider: Arc<dyn EnhancementProvider> = Arc::new(
        HttpProvider::new(&config.provider).context("Failed to create provider client")?,
    );
    info!("Enhancement provider: {}", config.provider.base_url);

    let objects: Arc<dyn ObjectStore> = Arc::new(
        HttpObjectStore::new(&config.storage).context("Failed to create object store client")?,
    );
    info!(
        "Object store: {} (bucket {})",
        config.storage.url, config.storage.bucket
    );

    let broadcaster: Arc<dyn Broadcaster> = Arc::new(
        HttpBroadcaster::new(&config.broadcast).context("Failed to create broadcast client")?,
    );

    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        provider,
        objects,
        store,
        broadcaster,
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    match &config.server.base_url {
        Some(base) => info!("Webhook URL: {}/api/v1/webhooks/enhancer", base),
        None => warn!("server.base_url not set; provider webhooks cannot reach this instance"),
    }

    // Create app state and router
    let state = Arc::new(AppState::new(config, authenticator, orchestrator));
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
