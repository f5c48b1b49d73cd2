//! # tableau-server
//!
//! Room coordination server for the Tableau collaborative whiteboard.
//!
//! This binary provides:
//! - **Rooms** addressed by six-character codes, created on first use and
//!   deleted when the last member leaves
//! - **Creator approval** for private rooms, with creator handoff when the
//!   creator disconnects
//! - **Canvas sync**: drawing operations relayed to peers, plus full
//!   snapshots for late joiners
//! - **Chat** to the whole room or to a single member
//! - **REST API** (axum) for health checks and room metadata

mod api;
mod approval;
mod canvas;
mod chat;
mod config;
mod error;
mod lifecycle;
mod membership;
mod rate_limit;
mod registry;
mod room;
mod store;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::lifecycle::Coordinator;
use crate::rate_limit::RateLimiter;
use crate::registry::RoomRegistry;
use crate::store::RoomStore;

/// How often pending join requests are checked for expiry.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tableau_server=debug")),
        )
        .init();

    info!(
        "Starting {} server v{}",
        tableau_shared::constants::APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = match &config.room_store_path {
        Some(path) => RoomStore::open(path.clone()).await?,
        None => {
            info!("No ROOM_STORE_PATH set, room records kept in memory");
            RoomStore::in_memory()
        }
    };
    info!(records = store.len().await, "Room store ready");

    let registry = Arc::new(RoomRegistry::new(config.chat_history_limit));
    let coordinator = Arc::new(Coordinator::new(registry, Arc::new(store)));

    // Rate limiter for the HTTP API: 10 req/s sustained, burst of 30
    let rate_limiter = RateLimiter::default();

    let app_state = AppState {
        coordinator: coordinator.clone(),
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // Unanswered join requests
    if let Some(ttl) = config.join_request_ttl {
        let coord = coordinator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let expired = coord.expire_requests(ttl).await;
                if expired > 0 {
                    debug!(expired, "Join request sweep");
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP / WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
