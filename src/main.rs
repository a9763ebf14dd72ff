use std::sync::Arc;

use anyhow::Context;
use item_catalog::config::Config;
use item_catalog::db::{create_pool, ensure_schema};
use item_catalog::middleware::SESSION_TTL_DAYS;
use item_catalog::routes::router;
use item_catalog::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "item_catalog=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting item catalog server...");
    tracing::info!("Connecting to database...");

    let pool = create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    ensure_schema(&pool)
        .await
        .context("Failed to create schema")?;
    tracing::info!("Database connection established");

    let addr = config.server_addr();
    let state = AppState::new(config, pool).context("Failed to build application state")?;
    let state = Arc::new(state);
    tokio::spawn(purge_sessions(state.clone()));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Item catalog listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Drops expired session records at startup and hourly after that.
async fn purge_sessions(state: Arc<AppState>) {
    let max_age = chrono::Duration::days(SESSION_TTL_DAYS);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60 * 60));
    loop {
        interval.tick().await;
        match state.sessions.purge_expired(max_age).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Purged {} expired sessions", n),
            Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
