//! Pakhuis Server - replicated JSON document store.
//!
//! Serves the document, search and change-feed HTTP API and runs one sync
//! engine per configured peer.

use pakhuis_server::config::Config;
use pakhuis_server::store::Store;
use pakhuis_server::sync::SyncManager;
use pakhuis_server::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pakhuis_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        node_id = %config.node_id,
        peers = config.peers.len(),
        "Starting Pakhuis on {}",
        config.listen_address
    );

    // Open the store (runs migrations and builds the index)
    let store = Store::open(config.store_options()).await?;

    // Start replication
    let sync = SyncManager::start(&store, &config.peers)?;

    let state = AppState {
        store: store.clone(),
        sync: sync.board(),
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;
    tracing::info!("Server listening on {}", config.listen_address);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    sync.shutdown().await;
    store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
