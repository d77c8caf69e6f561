//! Data-plane clusters.

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, Error, ResourceKind, Result};
use serde::{Deserialize, Serialize};

use crate::meta::{PendingAction, RowMeta};
use crate::resource::Reconcilable;
use crate::state::{ClusterDesiredState, ClusterEvent, ClusterStatus};

/// A request to register a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSpec {
    /// Provider cluster id to use as the row id; generated when absent.
    pub id: Option<ClusterId>,
    pub external_id: Option<String>,
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
    pub byoc: bool,
    pub managed: bool,
    pub status: Option<ClusterStatus>,
}

impl ClusterSpec {
    pub fn new(cloud_provider: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            cloud_provider: cloud_provider.into(),
            region: region.into(),
            managed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: ClusterId) -> Self {
        self.id = Some(id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub external_id: Option<String>,
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
    pub byoc: bool,
    pub managed: bool,
    pub status: ClusterStatus,
    pub desired: ClusterDesiredState,
    pub meta: RowMeta,
}

impl Cluster {
    /// Build an unsaved cluster row from a request.
    ///
    /// No status means `Provisioning`. Only pre-ready statuses and `Ready`
    /// are accepted as a starting point.
    pub fn new(spec: ClusterSpec, now: DateTime<Utc>) -> Result<Self> {
        let status = spec.status.unwrap_or(ClusterStatus::Provisioning);
        if !status.is_initial() {
            return Err(Error::invalid_configuration(format!(
                "a cluster cannot be created with status '{status}'"
            )));
        }
        if spec.cloud_provider.trim().is_empty() {
            return Err(Error::invalid_configuration("cloud_provider is required"));
        }
        if spec.region.trim().is_empty() {
            return Err(Error::invalid_configuration("region is required"));
        }

        Ok(Self {
            id: spec.id.unwrap_or_default(),
            external_id: spec.external_id,
            cloud_provider: spec.cloud_provider,
            region: spec.region,
            multi_az: spec.multi_az,
            byoc: spec.byoc,
            managed: spec.managed,
            status,
            desired: ClusterDesiredState::Ready,
            meta: RowMeta::new(now),
        })
    }

    /// Usable as a placement target for connectors.
    pub fn accepts_connectors(&self) -> bool {
        self.status == ClusterStatus::Ready
            && self.desired == ClusterDesiredState::Ready
            && !self.meta.is_deleted()
    }
}

impl Reconcilable for Cluster {
    type Desired = ClusterDesiredState;
    type Actual = ClusterStatus;
    type Event = ClusterEvent;

    const KIND: ResourceKind = ResourceKind::Cluster;
    const STALLED: ClusterEvent = ClusterEvent::Stalled;
    const REPORT_REJECTED: ClusterEvent = ClusterEvent::ReportRejected;

    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn desired(&self) -> ClusterDesiredState {
        self.desired
    }

    fn actual(&self) -> Option<ClusterStatus> {
        Some(self.status)
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn next_actual(&self, event: ClusterEvent) -> Result<ClusterStatus> {
        self.status.transition(event)
    }

    fn set_actual(&mut self, actual: ClusterStatus) {
        self.status = actual;
    }

    fn is_delete_requested(&self) -> bool {
        self.desired == ClusterDesiredState::Deleted
    }

    fn is_converged(&self) -> bool {
        match self.desired {
            ClusterDesiredState::Ready => self.status == ClusterStatus::Ready,
            ClusterDesiredState::Deleted => self.status == ClusterStatus::Deleted,
        }
    }

    fn is_settling(&self) -> bool {
        self.status.is_settling()
    }

    fn is_failed(&self) -> bool {
        self.status == ClusterStatus::Failed
    }

    fn is_removed(&self) -> bool {
        self.status == ClusterStatus::Deleted
    }

    fn request_delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == ClusterStatus::Failed {
            self.meta.soft_delete(now);
            return Ok(());
        }
        self.apply_transition(ClusterEvent::DeprovisionRequested, now)?;
        self.meta.claim(PendingAction::Deprovision, now);
        Ok(())
    }
}
