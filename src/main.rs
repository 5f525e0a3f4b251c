//! BidHub Live server.
//!
//! Wires the configured auction store to the live engine and keeps it
//! running until interrupted.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use bidhub_core::config::AppConfig;
use bidhub_core::error::AppError;
use bidhub_database::{DatabasePool, PgAuctionStore};
use bidhub_realtime::{AuctionStore, LiveAuctionService, MemoryStore, MemoryTransport};

#[tokio::main]
async fn main() {
    let env = std::env::var("BIDHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.is_json() {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().pretty().with_env_filter(filter).with_target(true).init();
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting BidHub Live v{}", env!("CARGO_PKG_VERSION"));

    let transport = Arc::new(MemoryTransport::new(config.realtime.channel_buffer_size));

    let (store, pool): (Arc<dyn AuctionStore>, Option<DatabasePool>) = match &config.database {
        Some(db) => {
            let pool = DatabasePool::connect(db).await?;
            bidhub_database::migration::run_migrations(pool.pool()).await?;
            let store: Arc<dyn AuctionStore> = Arc::new(PgAuctionStore::with_transport(
                pool.pool().clone(),
                transport.clone(),
            ));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("No database configured; auctions live in process memory");
            let store: Arc<dyn AuctionStore> =
                Arc::new(MemoryStore::with_transport(transport.clone()));
            (store, None)
        }
    };

    let service = LiveAuctionService::new(config.realtime.clone(), transport, store);
    tracing::info!(
        bid_timeout_ms = config.realtime.bid_timeout_ms,
        heartbeat_seconds = config.realtime.presence_heartbeat_seconds,
        "Live auction engine ready"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;
    tracing::info!("Shutdown signal received");

    service.disconnect().await?;
    let metrics = service.metrics.snapshot();
    tracing::info!(
        bids_accepted = metrics.bids_accepted,
        bids_rejected = metrics.bids_rejected,
        chat_messages = metrics.chat_messages_sent,
        "Live auction engine stopped"
    );

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(())
}
