mod alerts;
mod config;
mod connector;
mod db;
mod deploy;
mod handlers;
mod models;
mod monitor;
mod pool;
mod router;
mod scheduler;
mod validation;
mod vendor;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use connector::{ConnectorFactory, ConnectorOptions, NetworkTransportProvider};
use db::Store;
use deploy::PolicyDeployEngine;
use monitor::DeviceMonitor;
use pool::ConnectionPool;
use scheduler::PolicySyncScheduler;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub pool: Arc<ConnectionPool>,
    pub engine: Arc<PolicyDeployEngine>,
    pub scheduler: Arc<PolicySyncScheduler>,
    pub monitor: Arc<DeviceMonitor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csms_policy=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::load();
    tracing::info!("Starting CSMS policy service");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Initialize database
    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    // Device sessions
    let options = ConnectorOptions {
        connect_timeout: cfg.connect_timeout(),
        command_timeout: cfg.command_timeout(),
        reconnect_backoff: cfg.reconnect_backoff(),
        ..ConnectorOptions::default()
    };
    let factory = ConnectorFactory::new(Arc::new(NetworkTransportProvider), options);
    let pool = Arc::new(ConnectionPool::new(factory, Duration::from_secs(cfg.keepalive_interval)));
    let monitor = Arc::new(DeviceMonitor::new(
        pool.clone(),
        store.clone(),
        Duration::from_secs(cfg.monitor_interval),
    ));

    // Policy engine and periodic sync
    let engine = Arc::new(PolicyDeployEngine::new(store.clone(), pool.clone()));
    let scheduler = Arc::new(PolicySyncScheduler::new(engine.clone(), store.clone(), &cfg));
    if cfg.sync_enabled {
        scheduler.start();
    }

    let state = Arc::new(AppState {
        store,
        pool: pool.clone(),
        engine,
        scheduler: scheduler.clone(),
        monitor: monitor.clone(),
    });

    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("CSMS policy service listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background tasks");
    scheduler.stop().await;
    monitor.stop_all().await;
    pool.close_all().await;
    tracing::info!("CSMS policy service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
