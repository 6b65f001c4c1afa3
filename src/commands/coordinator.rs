use anyhow::{Context, Result};

use activity_status::config::Config;
use activity_status::coordinator::Coordinator;
use activity_status::seed::seed_instances;

use super::{connect_bus, connect_store, init_metrics, shutdown_signal, AdminServer};

/// Run the coordinator until SIGINT/SIGTERM
pub async fn coordinator(config: Config) -> Result<()> {
    init_metrics();

    let store = connect_store(&config).await?;
    let bus = connect_bus(&config).await?;

    if config.coordinator.seed_on_start {
        seed_instances(store.as_ref(), &config.seed)
            .await
            .context("Failed to seed instances")?;
    } else {
        store
            .ensure_collection()
            .await
            .context("Failed to prepare instance collection")?;
    }

    let admin = AdminServer::start(&config.admin)?;

    let coordinator = Coordinator::new(
        store,
        bus,
        config.bus.subjects.clone(),
        config.coordinator.clone(),
    )?;
    let handle = coordinator
        .start()
        .await
        .context("Failed to subscribe to check responses")?;

    shutdown_signal().await;

    tracing::info!("Shutting down gracefully...");
    handle.shutdown().await;
    if let Some(admin) = admin {
        admin.stop().await;
    }

    tracing::info!("Coordinator stopped");
    Ok(())
}

/// Run one sweep and exit
pub async fn sweep_once(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    let bus = connect_bus(&config).await?;

    let coordinator = Coordinator::new(
        store,
        bus,
        config.bus.subjects.clone(),
        config.coordinator.clone(),
    )?;
    let report = coordinator.sweep_once().await.context("Sweep aborted")?;

    println!("Sweep complete");
    println!("  Instances: {}", report.instances);
    println!("  Published: {}", report.dispatch.published);
    println!("  Failed:    {}", report.dispatch.failed);
    println!("  Elapsed:   {:?}", report.elapsed);

    Ok(())
}
