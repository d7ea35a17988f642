//! POS Sync Cache - terminal node
//!
//! Runs one terminal's cache and sync bus behind a small HTTP surface, and
//! relays this terminal's mutation events to its peers.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pos_sync_cache::api::{create_router, AppState};
use pos_sync_cache::config::Config;
use pos_sync_cache::sync::{relay_client, spawn_relay, RelayHandle};
use pos_sync_cache::QueryCache;

/// Timeout for a single relay POST to a peer.
const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main entry point for a terminal node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the query cache (sweeper running) and the sync bus
/// 4. Start relaying local events to configured peers
/// 5. Serve the HTTP surface until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pos_sync_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting POS sync cache node");

    let config = Config::from_env();
    info!(
        "Configuration loaded: node_id={}, max_entries={}, max_memory_bytes={}, default_ttl={}ms, dedup_window={}ms, sweep_interval={}ms, peers={}",
        config.node_id,
        config.max_entries,
        config.max_memory_bytes,
        config.default_ttl.as_millis(),
        config.dedup_window.as_millis(),
        config.sweep_interval.as_millis(),
        config.peers.len()
    );

    let state = AppState::from_config(&config);
    info!("Query cache and sync bus initialized");

    let client = relay_client(RELAY_TIMEOUT)?;
    let relay = spawn_relay(&state.bus, config.peers.clone(), client);
    info!("Relaying to {} peer(s)", relay.peer_count());

    let cache = state.cache.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cache, relay))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then closes the cache and
/// stops the relay.
async fn shutdown_signal(cache: QueryCache, relay: RelayHandle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    relay.abort();
    cache.close().await;
    warn!("Relay stopped and cache closed");
}
