use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convo_server::{
    api::{create_router, AppState},
    config::Config,
    db::SqliteStore,
    delivery::{LocalBus, LogPushSender, LogSmsSender},
    error::AppError,
    services::{AccountDefaults, Services},
    sweep::spawn_sweep,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,convo_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting convo server v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("✅ Configuration loaded");

    // Setup database with proper connection pooling
    let db = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    tracing::info!("✅ Database connected: {}", config.database_url);

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;

    tracing::info!("✅ Database migrations completed");

    let services = Services::new(
        Arc::new(SqliteStore::new(db.clone())),
        Arc::new(LocalBus::new()),
        Arc::new(LogPushSender),
        Arc::new(LogSmsSender),
        AccountDefaults::from(config.as_ref()),
    );

    // Spawn background task for scheduled message delivery
    spawn_sweep(services.clone(), Duration::from_secs(config.sweep_interval_secs));
    tracing::info!("✅ Scheduled message sweep started (every {}s)", config.sweep_interval_secs);

    let state = AppState::new(services, config.clone());
    let app = create_router(state);

    // Bind and serve
    let addr = config.server_address();
    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("🏥 Health check: http://{}/api/health", addr);
    tracing::info!("🔌 Sessions:     ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
