use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use activity_status::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "activity-status",
    version,
    about = "Fleet health checking over a message bus",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (environment variables are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sweep loop and the response correlator
    Coordinator {
        /// Seed the store before the first sweep
        #[arg(long, default_value = "false")]
        seed: bool,

        /// Override the sweep interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Run probe workers
    Worker {
        /// Number of workers in this process
        #[arg(short, long)]
        replicas: Option<usize>,
    },

    /// Run a monitored instance exposing GET /health
    Instance {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },

    /// Create the instance collection and insert missing instances
    Seed,

    /// Run a single sweep and exit
    SweepOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "activity-status starting");

    match cli.command {
        Commands::Coordinator {
            seed,
            interval_secs,
        } => {
            if seed {
                config.coordinator.seed_on_start = true;
            }
            if let Some(secs) = interval_secs {
                config.coordinator.sweep_interval_secs = secs;
            }
            config.validate().context("Invalid configuration")?;

            tracing::info!(
                interval_secs = config.coordinator.sweep_interval_secs,
                seed = config.coordinator.seed_on_start,
                "Starting coordinator"
            );
            commands::coordinator(config).await?;
        }

        Commands::Worker { replicas } => {
            if let Some(replicas) = replicas {
                config.worker.replicas = replicas;
            }
            config.validate().context("Invalid configuration")?;

            tracing::info!(replicas = config.worker.replicas, "Starting workers");
            commands::worker(config).await?;
        }

        Commands::Instance { bind } => {
            tracing::info!(%bind, "Starting monitored instance");
            commands::instance(bind).await?;
        }

        Commands::Seed => {
            config.validate().context("Invalid configuration")?;
            commands::seed(config).await?;
        }

        Commands::SweepOnce => {
            config.validate().context("Invalid configuration")?;
            commands::sweep_once(config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("activity_status=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("activity_status={level},warn"))
        })
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
