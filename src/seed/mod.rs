//! Instance seeding
//!
//! Populates the store with the fleet to monitor. Every region gets
//! `instance-to-be-monitored-{region}-{i}` for `i` in `1..=count`, addressed
//! as `{name}-service.{region}.{cluster_domain}:{port}`. Seeding is
//! idempotent: records whose host already exists are left untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::NewInstance;
use crate::store::{InsertReport, InstanceStore, StoreError};

/// Port every seeded instance listens on
pub const DEFAULT_SEED_PORT: u16 = 8080;

/// Instances per region when no count is configured
pub const DEFAULT_REGION_COUNT: usize = 2;

/// Cluster DNS suffix appended to seeded hosts
pub const DEFAULT_CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Regions seeded by default and the environment variable holding each count
pub const DEFAULT_REGIONS: [(&str, &str); 3] = [
    ("asia", "ASIA_COUNT"),
    ("europe", "EUROPE_COUNT"),
    ("usa", "USA_COUNT"),
];

/// What to seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Number of instances per region
    pub regions: BTreeMap<String, usize>,

    /// Port of every seeded instance
    pub port: u16,

    /// DNS suffix after `{region}`
    pub cluster_domain: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            regions: DEFAULT_REGIONS
                .iter()
                .map(|(region, _)| (region.to_string(), DEFAULT_REGION_COUNT))
                .collect(),
            port: DEFAULT_SEED_PORT,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
        }
    }
}

impl SeedConfig {
    /// Region counts from `ASIA_COUNT`, `EUROPE_COUNT` and `USA_COUNT`
    ///
    /// A missing or unparsable count falls back to [`DEFAULT_REGION_COUNT`].
    pub fn from_env() -> Self {
        let regions = DEFAULT_REGIONS
            .iter()
            .map(|(region, var)| (region.to_string(), count_from_env(var)))
            .collect();

        Self {
            regions,
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: &str, count: usize) -> Self {
        self.regions.insert(region.to_string(), count);
        self
    }

    /// Total number of instances described
    pub fn total(&self) -> usize {
        self.regions.values().sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("seed port must be greater than 0".to_string());
        }

        for region in self.regions.keys() {
            let valid = !region.is_empty()
                && region
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid {
                return Err(format!(
                    "region '{region}' must be a lowercase DNS label"
                ));
            }
        }

        Ok(())
    }

    /// Every instance described by this config, in region order
    pub fn build_instances(&self) -> Vec<NewInstance> {
        self.regions
            .iter()
            .flat_map(|(region, &count)| {
                (1..=count).map(move |i| {
                    let name = instance_name(region, i);
                    let host = instance_host(&name, region, &self.cluster_domain);
                    NewInstance::new(name, region.clone(), host, self.port)
                })
            })
            .collect()
    }
}

fn count_from_env(var: &str) -> usize {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    var = var,
                    value = %raw,
                    error = %e,
                    default = DEFAULT_REGION_COUNT,
                    "Invalid region count, using default"
                );
                DEFAULT_REGION_COUNT
            }
        },
        Err(_) => {
            tracing::info!(
                var = var,
                default = DEFAULT_REGION_COUNT,
                "Region count not set, using default"
            );
            DEFAULT_REGION_COUNT
        }
    }
}

/// Name of the `index`-th seeded instance of a region (1-based)
pub fn instance_name(region: &str, index: usize) -> String {
    format!("instance-to-be-monitored-{region}-{index}")
}

/// Resolvable host of a seeded instance
pub fn instance_host(name: &str, region: &str, cluster_domain: &str) -> String {
    format!("{name}-service.{region}.{cluster_domain}")
}

/// Create the collection if needed and insert every missing instance
pub async fn seed_instances(
    store: &dyn InstanceStore,
    config: &SeedConfig,
) -> Result<InsertReport, StoreError> {
    if store.collection_exists().await? {
        tracing::info!("Instance collection already exists");
    } else {
        tracing::info!("Instance collection does not exist, creating it");
        store.ensure_collection().await?;
    }

    let instances = config.build_instances();
    let report = store.insert_missing(instances).await?;

    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        regions = config.regions.len(),
        "Seeding complete"
    );

    Ok(report)
}
