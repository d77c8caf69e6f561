//! # Fleet
//!
//! Entry point for the control plane.
//!
//! - `fleet serve` wires the store, services, reconciliation loop and API
//!   and runs until Ctrl+C
//! - `fleet reconcile` runs one sweep and prints its report
//! - `fleet config` prints the effective configuration

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use fleet::Fleet;
use fleet::cli::{Cli, Commands};
use fleet::telemetry::init_tracing;
use fleet_core::FleetConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FleetConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_toml()?);
        }
        Commands::Reconcile { compact } => {
            init_tracing(&config.log)?;
            let fleet = Fleet::build(config).await?;
            let report = fleet.reconcile_once().await?;
            let rendered = if compact {
                serde_json::to_string(&report)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            println!("{rendered}");
        }
        Commands::Serve => {
            init_tracing(&config.log)?;
            info!(version = env!("CARGO_PKG_VERSION"), "fleet starting");
            Fleet::build(config).await?.serve().await?;
            info!("fleet stopped");
        }
    }
    Ok(())
}
