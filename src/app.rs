//! Wiring: store, services, reconciler and API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_control::{DesiredStateService, ReconcileTrigger};
use fleet_core::FleetConfig;
use fleet_model::parse_catalog;
use fleet_reconciler::{LoopConfig, Reconciler, ReconcilerConfig, ReconciliationLoop, SweepReport};
use fleet_store::open_store;
use fleet_web::{AppState, ServerConfig};
use tracing::{info, warn};

/// Everything a running control plane needs, built from one config.
pub struct Fleet {
    pub config: FleetConfig,
    pub state: AppState,
    pub reconciler: Arc<Reconciler>,
}

impl Fleet {
    /// Open the store, wire the services and load the catalog file if any.
    pub async fn build(config: FleetConfig) -> Result<Self> {
        let store = open_store(&config.store)
            .await
            .with_context(|| format!("failed to open store '{}'", config.store.url))?;

        let state = AppState::new(store.clone(), &config, ReconcileTrigger::new());
        if let Some(path) = &config.catalog.path {
            load_catalog(&state.desired, path).await?;
        }

        let reconciler_config = ReconcilerConfig::from_settings(&config.reconciler)
            .context("invalid reconciler settings")?;
        let reconciler = Arc::new(Reconciler::new(
            store,
            state.resolver.clone(),
            reconciler_config,
        ));

        info!(store = %config.store.url, "fleet wired");
        Ok(Self {
            config,
            state,
            reconciler,
        })
    }

    /// One sweep over the current store contents.
    pub async fn reconcile_once(&self) -> Result<SweepReport> {
        self.reconciler.sweep().await.context("reconcile sweep failed")
    }

    /// Serve the API and, when enabled, run the loop until Ctrl+C.
    pub async fn serve(self) -> Result<()> {
        let server_config = ServerConfig::from_config(&self.config)?;

        let background = if self.config.reconciler.enabled {
            let loop_config = LoopConfig::from_settings(&self.config.reconciler)
                .context("invalid reconciler settings")?;
            let (reconcile_loop, stopper) = ReconciliationLoop::new(
                self.reconciler.clone(),
                self.state.trigger.clone(),
                loop_config,
            );
            Some((tokio::spawn(reconcile_loop.run()), stopper))
        } else {
            info!("reconciliation loop disabled");
            None
        };

        fleet_web::serve(&server_config, self.state, shutdown_signal())
            .await
            .context("API server failed")?;

        if let Some((handle, stopper)) = background {
            stopper.stop();
            let stats = handle.await.context("reconciliation loop task failed")?;
            info!(
                sweeps = stats.sweeps,
                failed_sweeps = stats.failed_sweeps,
                "reconciliation loop stopped"
            );
        }
        Ok(())
    }
}

/// Read a JSON catalog file and upsert every entry.
pub async fn load_catalog(desired: &DesiredStateService, path: &Path) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
    let types = parse_catalog(&raw).with_context(|| format!("bad catalog '{}'", path.display()))?;
    Ok(desired.load_catalog(types).await?)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(error) => warn!(%error, "cannot listen for Ctrl+C, shutting down"),
    }
}
