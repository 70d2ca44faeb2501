//! tallyd — the Tally metrics server.
//!
//! Assembles the storage backend, the metrics service with its persistence
//! policy, and the HTTP API into one process.
//!
//! # Usage
//!
//! ```text
//! tallyd -a localhost:8080 -i 300 -f /tmp/metrics-db.json -r true
//! DATABASE_DSN=postgres://localhost/metrics tallyd
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tally_api::{AppState, build_router};
use tally_service::MetricsService;
use tally_store::{FileStateStore, MemStorage, PgStorage, RedbStateStore, StateStore, Storage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ServerConfig, StateFormat};

const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LOG_FILTER: &str = "info,tallyd=debug,tally=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = ServerConfig::load()?;
    run(config).await
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        address = %config.address,
        backend = if config.database_dsn.is_empty() { "memory" } else { "postgres" },
        state_format = ?config.state_format,
        "tally server starting"
    );

    // ── Storage backend ────────────────────────────────────────

    let pg = if config.database_dsn.is_empty() {
        None
    } else {
        let pg = PgStorage::connect(&config.database_dsn, DB_CONNECT_TIMEOUT)
            .await
            .context("failed to connect postgres")?;
        info!("connected to PostgreSQL");
        Some(pg)
    };
    let storage: Arc<dyn Storage> = match &pg {
        Some(pg) => Arc::new(pg.clone()),
        None => Arc::new(MemStorage::new()),
    };

    let state_store: Arc<dyn StateStore> = match config.state_format {
        StateFormat::Json => Arc::new(FileStateStore::new()),
        StateFormat::Redb => Arc::new(RedbStateStore::new()),
    };

    // ── Metrics service ────────────────────────────────────────

    let mut service = MetricsService::new(storage).with_state_store(state_store);
    service.configure_persistence(config.persistence());
    service
        .restore_state()
        .await
        .context("failed to restore metric state")?;
    let service = Arc::new(service);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let autosave = service.start_autosave(shutdown_rx, |e| {
        error!(error = %e, "autosave failed");
    });

    // ── API server ─────────────────────────────────────────────

    let mut state = AppState::new(Arc::clone(&service));
    if let Some(pg) = &pg {
        state = state.with_health(Arc::new(pg.clone()));
    }
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(addr = %listener.local_addr()?, "metrics server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Shutdown ───────────────────────────────────────────────

    stop_autosave(&shutdown_tx, autosave).await;
    if let Err(e) = service.save_state().await {
        error!(error = %e, "failed to save metrics on shutdown");
    }
    if let Some(pg) = pg {
        pg.close().await;
    }

    info!("tally server stopped");
    Ok(())
}

/// Signal the autosave task and wait for it. Returns false when the task
/// did not finish cleanly; the final flush runs either way.
async fn stop_autosave(
    shutdown_tx: &watch::Sender<bool>,
    autosave: Option<JoinHandle<()>>,
) -> bool {
    if shutdown_tx.send(true).is_err() {
        debug!("autosave receiver already dropped");
    }
    let Some(handle) = autosave else {
        return true;
    };
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "autosave task failed");
            false
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
