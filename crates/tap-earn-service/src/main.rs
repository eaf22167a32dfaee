//! Tap-Earn Service - HTTP API for the tap-to-earn ledger
//!
//! This is the main entry point for the tap-earn service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tap_earn_service::{create_router, AppState, CoinGeckoOracle, ServiceConfig};
use tap_earn_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tap_earn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tap-Earn Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        bot_username = %config.bot_username,
        price_refresh_seconds = %config.price_refresh_seconds,
        "Service configuration loaded"
    );

    // Initialize the store
    let store: Arc<dyn Store> = if let Some(url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL");
        let store = PgStore::connect(url, config.database_max_connections).await?;
        store.migrate().await?;
        tracing::info!("Database migrations applied");
        Arc::new(store)
    } else {
        tracing::warn!("DATABASE_URL not set - using the in-memory store, data will not persist");
        Arc::new(MemoryStore::new())
    };

    // Start the price oracle
    let oracle = Arc::new(CoinGeckoOracle::new(
        config.coingecko_api_url.clone(),
        config.coingecko_api_key.clone(),
        Duration::from_secs(config.price_refresh_seconds),
        config.ledger.points_per_usd,
    )?);
    Arc::clone(&oracle).spawn_refresh();

    let catalog = config.load_catalog()?;

    // Build app state
    let state = AppState::new(store, oracle, catalog, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
