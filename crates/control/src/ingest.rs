//! Agent report ingest.
//!
//! Folds a batch of status reports from one agent into the store. Reports
//! are applied in order, one at a time, and a bad report never stops the
//! rest of the batch.

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{ClusterId, ConnectorId, Error, ResourceKind, Result};
use fleet_model::{
    AckOutcome, ClusterEvent, ClusterStatus, ConnectorEvent, ConnectorState, IngestReport,
    PendingAction, Reconcilable, ReportAck, StatusReport,
};
use fleet_store::{DesiredStateStore, Persist};
use tracing::{debug, info, warn};

pub struct AgentReportIngest {
    store: Arc<dyn DesiredStateStore>,
    max_cas_retries: u32,
}

impl AgentReportIngest {
    pub fn new(store: Arc<dyn DesiredStateStore>, max_cas_retries: u32) -> Self {
        Self {
            store,
            max_cas_retries,
        }
    }

    /// Apply `reports` from the agent of `cluster_id`.
    ///
    /// Fails as a whole only when the cluster is unknown; every other
    /// problem is reported per item.
    pub async fn ingest(
        &self,
        cluster_id: ClusterId,
        reports: Vec<StatusReport>,
    ) -> Result<IngestReport> {
        self.store.get_cluster(cluster_id).await?;

        let mut acks = Vec::with_capacity(reports.len());
        for report in &reports {
            acks.push(self.ingest_one(cluster_id, report).await);
        }

        let outcome = IngestReport::new(cluster_id, acks);
        info!(
            cluster_id = %cluster_id,
            reports = reports.len(),
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "ingested agent reports"
        );
        Ok(outcome)
    }

    async fn ingest_one(&self, cluster_id: ClusterId, report: &StatusReport) -> ReportAck {
        let mut retries = 0;
        loop {
            let result = match report {
                StatusReport::Cluster { id, status, .. } => {
                    self.apply_cluster(cluster_id, *id, *status, report).await
                }
                StatusReport::Connector { id, state, .. } => {
                    self.apply_connector(cluster_id, *id, *state, report).await
                }
            };

            match result {
                Ok(ack) => return ack,
                Err(Error::VersionMismatch { .. }) if retries < self.max_cas_retries => {
                    retries += 1;
                    debug!(
                        id = %report.id_string(),
                        retries,
                        "report raced another writer, re-reading"
                    );
                }
                Err(error) => {
                    let id = report.id_string();
                    match &error {
                        Error::NotOwnedByCluster { .. } => {
                            warn!(%cluster_id, %id, %error, "cross-cluster report refused");
                        }
                        _ => warn!(
                            cluster_id = %cluster_id,
                            id = %id,
                            code = error.code(),
                            %error,
                            "report rejected"
                        ),
                    }
                    return ReportAck::rejected(report, &error);
                }
            }
        }
    }

    async fn apply_cluster(
        &self,
        cluster_id: ClusterId,
        id: ClusterId,
        status: ClusterStatus,
        report: &StatusReport,
    ) -> Result<ReportAck> {
        if id != cluster_id {
            return Err(Error::not_owned_by_cluster(
                ResourceKind::Cluster,
                id.to_string(),
                cluster_id.to_string(),
            ));
        }
        let cluster = self.store.get_cluster(id).await?;
        self.apply(cluster, ClusterEvent::Reported(status), report).await
    }

    async fn apply_connector(
        &self,
        cluster_id: ClusterId,
        id: ConnectorId,
        state: ConnectorState,
        report: &StatusReport,
    ) -> Result<ReportAck> {
        let connector = self.store.get_connector(id).await?;
        if connector.cluster_id != Some(cluster_id) {
            return Err(Error::not_owned_by_cluster(
                ResourceKind::Connector,
                id.to_string(),
                cluster_id.to_string(),
            ));
        }
        self.apply(connector, ConnectorEvent::Reported(state), report).await
    }

    /// Arbitrate by reported version, then apply the transition as one CAS.
    async fn apply<R>(&self, row: R, event: R::Event, report: &StatusReport) -> Result<ReportAck>
    where
        R: Reconcilable + Persist,
    {
        let reported = report.resource_version();
        let known = row.meta().reported_version;
        if reported < known {
            debug!(id = %row.id_string(), reported, known, "stale report ignored");
            let state = state_label(&row);
            return Ok(ReportAck::settled(report, AckOutcome::Stale, row.version(), state));
        }
        if reported == known {
            let state = state_label(&row);
            return Ok(ReportAck::settled(report, AckOutcome::Unchanged, row.version(), state));
        }

        let now = Utc::now();
        let expected = row.version();
        let previous = row.actual();
        let mut next = row.clone();

        match next.apply_transition(event, now) {
            Ok(state) => {
                let meta = next.meta_mut();
                meta.reported_version = reported;
                if previous != Some(state) && meta.pending == Some(PendingAction::Assign) {
                    meta.clear_pending();
                }
                if next.is_failed() {
                    next.meta_mut().failure_reason = Some(
                        report
                            .message()
                            .unwrap_or("agent reported a failure")
                            .to_string(),
                    );
                }
                if next.is_converged() || next.is_failed() {
                    next.meta_mut().clear_pending();
                }
                if next.is_removed() {
                    next.meta_mut().soft_delete(now);
                }

                let written = next.persist(self.store.as_ref(), expected).await?;
                debug!(
                    kind = %R::KIND,
                    id = %written.id_string(),
                    state = %state,
                    resource_version = written.version(),
                    "report accepted"
                );
                Ok(ReportAck::settled(report, AckOutcome::Accepted, written.version(), state))
            }
            Err(error @ Error::InvalidTransition { .. }) => self.reject(row, &error, report).await,
            Err(error) => Err(error),
        }
    }

    /// Record an invalid report by failing the resource instead of applying it.
    async fn reject<R>(&self, row: R, error: &Error, report: &StatusReport) -> Result<ReportAck>
    where
        R: Reconcilable + Persist,
    {
        warn!(kind = %R::KIND, id = %row.id_string(), %error, "invalid report, failing resource");

        let now = Utc::now();
        let expected = row.version();
        let mut forced = row.clone();
        let Ok(state) = forced.apply_transition(R::REPORT_REJECTED, now) else {
            let state = state_label(&row);
            return Ok(ReportAck::rejected(report, error).with_row(row.version(), state));
        };

        let meta = forced.meta_mut();
        meta.reported_version = report.resource_version();
        meta.clear_pending();
        meta.failure_reason = Some(format!("rejected agent report: {error}"));

        let written = forced.persist(self.store.as_ref(), expected).await?;
        Ok(ReportAck::rejected(report, error).with_row(written.version(), state))
    }
}

fn state_label<R: Reconcilable>(row: &R) -> String {
    row.actual()
        .map_or_else(|| "unassigned".to_string(), |state| state.to_string())
}
