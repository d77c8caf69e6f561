//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fleet - cluster and connector control plane
#[derive(Parser, Debug)]
#[command(name = "fleet")]
#[command(version)]
#[command(about = "Reconciles desired and actual state for clusters and connectors")]
pub struct Cli {
    /// TOML configuration file; `FLEET_*` variables override it
    #[arg(short, long, global = true, env = "FLEET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the API and the reconciliation loop until Ctrl+C
    Serve,

    /// Run one reconcile sweep and print the report as JSON
    Reconcile {
        /// Print the report on one line
        #[arg(long, default_value_t = false)]
        compact: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
