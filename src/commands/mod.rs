pub mod coordinator;
pub mod instance;
pub mod seed;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use activity_status::bus::{MessageBus, RedisBus};
use activity_status::config::{AdminConfig, Config};
use activity_status::server::{admin_router, serve};
use activity_status::store::{InstanceStore, PostgresStore};

// Re-export command functions for convenience
pub use coordinator::{coordinator, sweep_once};
pub use instance::instance;
pub use seed::seed;
pub use worker::worker;

/// Connect to the message bus; failure is fatal for every long-running role
async fn connect_bus(config: &Config) -> Result<Arc<dyn MessageBus>> {
    let bus = RedisBus::connect(config.bus.redis.clone())
        .await
        .with_context(|| format!("Failed to connect to message bus at {}", config.bus.redis.url))?;
    Ok(Arc::new(bus))
}

/// Connect to the state store; failure is fatal
async fn connect_store(config: &Config) -> Result<Arc<dyn InstanceStore>> {
    let store = PostgresStore::connect(config.store.clone())
        .await
        .context("Failed to connect to state store")?;
    Ok(Arc::new(store))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received");
}

/// Background admin server (metrics, liveness)
struct AdminServer {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AdminServer {
    fn start(config: &AdminConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let addr = config.socket_addr()?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let signal = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = serve(addr, admin_router(), signal).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        });

        Ok(Some(Self { handle, shutdown }))
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

fn init_metrics() {
    if let Err(e) = activity_status::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }
}
