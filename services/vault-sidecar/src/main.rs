//! Vault sidecar - Main Entry Point

use anyhow::Context;
use tracing::info;
use vault_sidecar::{Config, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => e.exit(),
    };

    rust_common::init_tracing(&config.tracing_config()).context("initialising tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.vault_addr,
        "Starting vault sidecar"
    );

    let summary = run(config).await.context("vault sidecar failed")?;

    info!(
        method = summary.method,
        secrets = summary.fetched.len(),
        revoked = summary.revoked,
        "Vault sidecar stopped"
    );
    Ok(())
}
