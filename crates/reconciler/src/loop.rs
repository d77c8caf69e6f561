//! Periodic and triggered reconciliation.

use std::sync::Arc;
use std::time::Duration;

use fleet_control::ReconcileTrigger;
use fleet_core::config::ReconcilerSettings;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Time between scheduled sweeps.
    pub interval: Duration,
}

impl LoopConfig {
    pub fn from_settings(settings: &ReconcilerSettings) -> Result<Self> {
        let interval = settings.interval();
        if interval.is_zero() {
            return Err(Error::invalid_config("reconcile interval must be positive"));
        }
        Ok(Self { interval })
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Handle for stopping a running loop. Dropping it also stops the loop.
#[derive(Debug)]
pub struct LoopStopper {
    tx: watch::Sender<bool>,
}

impl LoopStopper {
    pub fn stop(&self) {
        // A closed channel means the loop is already gone.
        let _ = self.tx.send(true);
    }
}

/// Counters for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub sweeps: u64,
    pub failed_sweeps: u64,
}

/// Runs a sweep every interval and whenever the trigger fires.
pub struct ReconciliationLoop {
    reconciler: Arc<Reconciler>,
    trigger: ReconcileTrigger,
    config: LoopConfig,
    stop: watch::Receiver<bool>,
    stats: LoopStats,
}

impl ReconciliationLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        trigger: ReconcileTrigger,
        config: LoopConfig,
    ) -> (Self, LoopStopper) {
        let (tx, stop) = watch::channel(false);
        let this = Self {
            reconciler,
            trigger,
            config,
            stop,
            stats: LoopStats::default(),
        };
        (this, LoopStopper { tx })
    }

    /// Run until stopped. The first sweep happens immediately.
    pub async fn run(mut self) -> LoopStats {
        info!(interval_secs = self.config.interval.as_secs(), "reconciliation loop started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.sweep_once("interval").await,
                () = self.trigger.notified() => self.sweep_once("trigger").await,
            }
        }

        info!(
            sweeps = self.stats.sweeps,
            failed = self.stats.failed_sweeps,
            "reconciliation loop stopped"
        );
        self.stats
    }

    async fn sweep_once(&mut self, cause: &'static str) {
        self.stats.sweeps += 1;
        match self.reconciler.sweep().await {
            Ok(report) => {
                debug!(cause, planned = report.planned, applied = report.applied, "sweep finished");
            }
            Err(error) => {
                self.stats.failed_sweeps += 1;
                warn!(cause, %error, "sweep failed");
            }
        }
    }
}
