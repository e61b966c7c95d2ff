use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod aggregator;
mod auth;
mod config;
mod error;
mod models;
mod projections;
mod routes;
mod store;

#[cfg(test)]
mod tests;

use config::Config;
use routes::{router, AppState};
use store::Store;

/// Episode tracking API
/// Reads are public, writes need the admin token
/// Chart and progress data are derived from the watch history on each request
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    if config.admin_token.is_none() {
        warn!("TRACKER_ADMIN_TOKEN not set, all writes will be rejected");
    }

    let store = Store::open(&config.db_path).context("failed to open database")?;
    if let Some(seed_path) = &config.seed_path {
        store
            .load_seed(seed_path)
            .with_context(|| format!("failed to load seed catalog {}", seed_path.display()))?;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState {
        store: Arc::new(store),
        config: Arc::new(config),
    };
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
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
