//! taskdesk-sync server binary
//!
//! Wires the in-memory backend, query cache, realtime bridge and route guard
//! behind an HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskdesk_sync::api::create_router;
use taskdesk_sync::backend::MemoryBackend;
use taskdesk_sync::realtime::{BridgeConfig, RealtimeBridge};
use taskdesk_sync::{spawn_cleanup_task, AppState, Config};

/// Main entry point for the sync server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create backend and query cache
/// 4. Start realtime bridge and background eviction task
/// 5. Serve the router until SIGINT/SIGTERM, then release subscriptions
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdesk_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting taskdesk-sync server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, stale_time={}s, gc_time={}s, max_entries={}, retries={}",
        config.server_port,
        config.stale_time_secs,
        config.gc_time_secs,
        config.max_entries,
        config.retry_count
    );

    let backend = Arc::new(MemoryBackend::new());
    let state = AppState::from_config(&config, backend.clone());

    let bridge = RealtimeBridge::start(backend, state.client.clone(), BridgeConfig::default())
        .await
        .context("Failed to start realtime bridge")?;
    let state = state.with_realtime(bridge.monitor());

    let cleanup_handle = spawn_cleanup_task(state.client.clone(), config.cleanup_interval);
    info!("Background eviction task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("Server error")?;

    bridge.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the eviction task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
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

    cleanup_handle.abort();
    warn!("Eviction task aborted");
}
