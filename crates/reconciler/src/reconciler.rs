//! Reconciler implementation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_control::NamespaceResolver;
use fleet_core::config::ReconcilerSettings;
use fleet_core::Error as ControlError;
use fleet_model::{Cluster, Connector, PendingAction, Reconcilable};
use fleet_store::{DesiredStateStore, Persist};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{ActionRecord, PlannedAction, ReconcileAction, ReconcileOutcome, SweepReport};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// How long a resource may sit in a settling state before it is failed.
    pub staleness_threshold: Duration,
}

impl ReconcilerConfig {
    pub fn from_settings(settings: &ReconcilerSettings) -> Result<Self> {
        let staleness_threshold = Duration::from_std(settings.staleness_threshold())
            .map_err(|e| Error::invalid_config(format!("staleness threshold: {e}")))?;
        if staleness_threshold <= Duration::zero() {
            return Err(Error::invalid_config("staleness threshold must be positive"));
        }
        Ok(Self {
            staleness_threshold,
        })
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::seconds(900),
        }
    }
}

/// Decide the next action for `resource`.
///
/// Pure: depends only on the row and `now`. Precedence, first match wins:
/// soft-deleted, stalled, delete requested, failed, never assigned, not
/// converged. A row is stalled when it is settling, or holds an unanswered
/// claim, for longer than the threshold.
pub fn plan<R: Reconcilable>(
    resource: &R,
    now: DateTime<Utc>,
    staleness_threshold: Duration,
) -> ReconcileAction {
    let meta = resource.meta();

    if resource.is_deleted() {
        return ReconcileAction::NoOp;
    }
    let waiting = resource.is_settling() || (meta.pending.is_some() && !resource.is_converged());
    if waiting && meta.idle_for(now) > staleness_threshold {
        return ReconcileAction::EscalateFailed;
    }
    if resource.is_delete_requested() && !resource.is_converged() {
        return if matches!(meta.pending, Some(PendingAction::Delete | PendingAction::Deprovision)) {
            ReconcileAction::NoOp
        } else {
            ReconcileAction::RequestDelete
        };
    }
    if resource.is_failed() {
        return ReconcileAction::NoOp;
    }
    if resource.actual().is_none() {
        return ReconcileAction::AssignNew;
    }
    if !resource.is_converged() && meta.pending.is_none() {
        return ReconcileAction::RequestUpdate;
    }
    ReconcileAction::NoOp
}

/// Diffs desired against last-known actual state and claims the next step.
///
/// Safe to run from several processes at once: every claim is a
/// compare-and-swap on the version the plan was made against.
pub struct Reconciler {
    store: Arc<dyn DesiredStateStore>,
    resolver: Arc<NamespaceResolver>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn DesiredStateStore>,
        resolver: Arc<NamespaceResolver>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn plan<R: Reconcilable>(&self, resource: &R, now: DateTime<Utc>) -> ReconcileAction {
        plan(resource, now, self.config.staleness_threshold)
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Reconcile every cluster and connector from one snapshot.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let snapshot = self.store.snapshot().await?;

        let mut examined = 0;
        let mut converged = 0;
        let mut actions = Vec::new();

        for cluster in snapshot.clusters().filter(|c| !c.is_deleted()) {
            examined += 1;
            converged += usize::from(cluster.is_converged());
            if let Some(record) = self.reconcile_cluster(cluster, now).await {
                actions.push(record);
            }
        }
        for connector in snapshot.connectors().filter(|c| !c.is_deleted()) {
            examined += 1;
            converged += usize::from(connector.is_converged());
            if let Some(record) = self.reconcile_connector(connector, now).await {
                actions.push(record);
            }
        }

        let report = SweepReport::new(snapshot.taken_at(), examined, converged, actions);
        if report.is_settled() {
            debug!(examined, "sweep found nothing to do");
        } else {
            info!(
                examined,
                planned = report.planned,
                applied = report.applied,
                lost_races = report.lost_races,
                deferred = report.deferred,
                failed = report.failed,
                "sweep complete"
            );
        }
        Ok(report)
    }

    /// Plan and apply one cluster. `None` when nothing was planned.
    pub async fn reconcile_cluster(
        &self,
        cluster: &Cluster,
        now: DateTime<Utc>,
    ) -> Option<ActionRecord> {
        let action = self.plan(cluster, now);
        if action.is_noop() {
            return None;
        }
        let outcome = match action {
            ReconcileAction::AssignNew | ReconcileAction::NoOp => ReconcileOutcome::Skipped,
            _ => self.claim(cluster, action, now).await,
        };
        Some(self.record(cluster, action, outcome))
    }

    /// Plan and apply one connector. `None` when nothing was planned.
    pub async fn reconcile_connector(
        &self,
        connector: &Connector,
        now: DateTime<Utc>,
    ) -> Option<ActionRecord> {
        let action = self.plan(connector, now);
        if action.is_noop() {
            return None;
        }
        let outcome = match action {
            ReconcileAction::AssignNew => {
                let namespace_id = connector.namespace_id;
                to_outcome(
                    self.resolver
                        .assign_from(connector.clone(), namespace_id)
                        .await
                        .map(|assigned| assigned.map_or(connector.version(), |row| row.version())),
                )
            }
            ReconcileAction::NoOp => ReconcileOutcome::Skipped,
            _ => self.claim(connector, action, now).await,
        };
        Some(self.record(connector, action, outcome))
    }

    /// Write the claim for `action` as a CAS on the planned version.
    async fn claim<R>(
        &self,
        resource: &R,
        action: ReconcileAction,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome
    where
        R: Reconcilable + Persist,
    {
        let expected = resource.version();
        let mut next = resource.clone();

        let prepared = match action {
            ReconcileAction::RequestUpdate => {
                next.meta_mut().claim(PendingAction::Update, now);
                Ok(())
            }
            ReconcileAction::RequestDelete => next.request_delete(now),
            ReconcileAction::EscalateFailed => self.escalate(&mut next, now),
            ReconcileAction::AssignNew | ReconcileAction::NoOp => return ReconcileOutcome::Skipped,
        };
        if let Err(error) = prepared {
            return to_outcome(Err(error));
        }

        to_outcome(
            next.persist(self.store.as_ref(), expected)
                .await
                .map(|written| written.version()),
        )
    }

    fn escalate<R: Reconcilable>(
        &self,
        resource: &mut R,
        now: DateTime<Utc>,
    ) -> fleet_core::Result<()> {
        let idle = resource.meta().idle_for(now).num_seconds();
        let from = resource
            .actual()
            .map_or_else(|| "unassigned".to_string(), |state| state.to_string());

        let threshold = self.config.staleness_threshold.num_seconds();
        let id = resource.id_string();

        if resource.is_failed() && resource.is_delete_requested() {
            // Nothing is left to confirm the teardown.
            let meta = resource.meta_mut();
            meta.soft_delete(now);
            meta.failure_reason = Some(format!(
                "agent never confirmed removal after {idle}s (threshold {threshold}s)"
            ));
            warn!(kind = %R::KIND, %id, idle_secs = idle, "unconfirmed delete abandoned");
            return Ok(());
        }

        resource.apply_transition(R::STALLED, now)?;
        let meta = resource.meta_mut();
        meta.clear_pending();
        meta.failure_reason = Some(format!(
            "no progress from agent in state '{from}' for {idle}s (threshold {threshold}s)"
        ));

        warn!(kind = %R::KIND, %id, %from, idle_secs = idle, "stale resource escalated to failed");
        Ok(())
    }

    fn record<R: Reconcilable>(
        &self,
        resource: &R,
        action: ReconcileAction,
        outcome: ReconcileOutcome,
    ) -> ActionRecord {
        let id = resource.id_string();
        match &outcome {
            ReconcileOutcome::Applied { resource_version } => {
                debug!(kind = %R::KIND, %id, %action, resource_version, "action applied");
            }
            ReconcileOutcome::LostRace => {
                debug!(kind = %R::KIND, %id, %action, "lost race, another writer got there first");
            }
            ReconcileOutcome::Deferred { reason } => {
                debug!(kind = %R::KIND, %id, %action, %reason, "action deferred");
            }
            ReconcileOutcome::Failed { reason } => {
                warn!(kind = %R::KIND, %id, %action, %reason, "action failed");
            }
            ReconcileOutcome::Skipped => {}
        }

        ActionRecord {
            planned: PlannedAction {
                kind: R::KIND,
                id,
                action,
                expected_version: resource.version(),
            },
            outcome,
        }
    }
}

fn to_outcome(result: fleet_core::Result<u64>) -> ReconcileOutcome {
    match result {
        Ok(resource_version) => ReconcileOutcome::Applied { resource_version },
        Err(ControlError::VersionMismatch { .. }) => ReconcileOutcome::LostRace,
        Err(
            error @ (ControlError::ClusterNotReady { .. } | ControlError::CapacityExceeded { .. }),
        ) => ReconcileOutcome::Deferred {
            reason: error.to_string(),
        },
        Err(error) => ReconcileOutcome::Failed {
            reason: error.to_string(),
        },
    }
}
