use anyhow::{Context, Result};

use activity_status::config::Config;
use activity_status::seed::seed_instances;

use super::connect_store;

/// Insert the configured fleet, skipping hosts already present
pub async fn seed(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;

    println!("Seeding instances");
    println!("=================");
    for (region, count) in &config.seed.regions {
        println!("  {region}: {count}");
    }

    let report = seed_instances(store.as_ref(), &config.seed)
        .await
        .context("Failed to seed instances")?;

    println!();
    println!("  Inserted: {}", report.inserted);
    println!("  Skipped:  {}", report.skipped);

    Ok(())
}
