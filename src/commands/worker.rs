use std::sync::Arc;

use anyhow::{Context, Result};

use activity_status::config::Config;
use activity_status::prober::HealthProber;
use activity_status::worker::WorkerPool;

use super::{connect_bus, init_metrics, shutdown_signal, AdminServer};

/// Run probe workers until SIGINT/SIGTERM
pub async fn worker(config: Config) -> Result<()> {
    init_metrics();

    let bus = connect_bus(&config).await?;
    let prober = HealthProber::new(config.prober.clone()).context("Failed to build prober")?;

    let admin = AdminServer::start(&config.admin)?;

    let pool = WorkerPool::new(
        bus,
        Arc::new(prober),
        config.bus.subjects.clone(),
        config.worker.clone(),
    );
    let handle = pool
        .start()
        .await
        .context("Failed to join worker queue group")?;

    shutdown_signal().await;

    tracing::info!("Shutting down gracefully...");
    let stats: Vec<_> = handle.stats().iter().map(|s| s.handled()).collect();
    handle.shutdown().await;
    if let Some(admin) = admin {
        admin.stop().await;
    }

    tracing::info!(handled = ?stats, "Workers stopped");
    Ok(())
}
