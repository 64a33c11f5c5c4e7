//! DUST Ledger Service - HTTP API entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dust_coord::{CoordStore, MemoryCoord};
use dust_service::{create_router, jobs, AppState, ServiceConfig};
use dust_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dust=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DUST ledger service");

    let config = ServiceConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        app_directory = %config.app_directory_url,
        pricing_configured = %config.pricing_url.is_some(),
        "Service configuration loaded"
    );

    let store = Arc::new(PgStore::connect(&config.database_url, config.database_max_connections).await?);
    store.migrate().await?;
    tracing::info!("Database migrations applied");

    let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());

    let state = AppState::new(Arc::clone(&store), Arc::clone(&coord), config.clone());

    // Background reconciler: cache sync, pending expiry, rollups, relay.
    let _jobs = jobs::spawn_all(store, coord, &state.events, &config);
    tracing::info!("Background reconciler started");

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    axum::serve(listener, app).await?;

    Ok(())
}
