use std::net::SocketAddr;

use anyhow::{Context, Result};

use activity_status::server::{instance_router, serve};

use super::shutdown_signal;

/// Serve `GET /health` until SIGINT/SIGTERM
pub async fn instance(bind: SocketAddr) -> Result<()> {
    serve(bind, instance_router(), shutdown_signal())
        .await
        .context("Instance server failed")?;
    Ok(())
}
