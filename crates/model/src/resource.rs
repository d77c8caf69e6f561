//! The capability set shared by every reconcilable resource kind.
//!
//! Clusters and connectors go through the same plan/claim/apply shape; the
//! reconciler only ever talks to them through this trait.

use std::fmt;

use chrono::{DateTime, Utc};
use fleet_core::{ResourceKind, Result};

use crate::meta::RowMeta;

pub trait Reconcilable: Clone + fmt::Debug + Send + Sync + 'static {
    type Desired: Copy + PartialEq + fmt::Debug + fmt::Display + Send + Sync;
    type Actual: Copy + PartialEq + fmt::Debug + fmt::Display + Send + Sync;
    type Event: Copy + fmt::Debug + fmt::Display + Send + Sync;

    const KIND: ResourceKind;
    /// Event used when the agent made no progress in time.
    const STALLED: Self::Event;
    /// Event used when an agent report was refused.
    const REPORT_REJECTED: Self::Event;

    fn id_string(&self) -> String;

    fn desired(&self) -> Self::Desired;

    /// Last actual state, `None` if no agent has been asked to act yet.
    fn actual(&self) -> Option<Self::Actual>;

    fn meta(&self) -> &RowMeta;

    fn meta_mut(&mut self) -> &mut RowMeta;

    /// Pure transition: what `event` would move the actual state to.
    fn next_actual(&self, event: Self::Event) -> Result<Self::Actual>;

    fn set_actual(&mut self, actual: Self::Actual);

    fn is_delete_requested(&self) -> bool;

    /// The actual state fulfils the desired state.
    fn is_converged(&self) -> bool;

    /// The actual state is one the agent should move out of on its own.
    fn is_settling(&self) -> bool;

    fn is_failed(&self) -> bool;

    /// The agent confirmed the resource is gone.
    fn is_removed(&self) -> bool;

    /// Record a teardown request on the row.
    ///
    /// Rows with nothing left for an agent to remove are soft-deleted
    /// directly; the rest get a pending delete for their agent.
    fn request_delete(&mut self, now: DateTime<Utc>) -> Result<()>;

    fn version(&self) -> u64 {
        self.meta().resource_version
    }

    fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }

    /// Apply `event`, stamping `status_changed_at` if the state moved.
    fn apply_transition(&mut self, event: Self::Event, now: DateTime<Utc>) -> Result<Self::Actual> {
        let next = self.next_actual(event)?;
        if self.actual() != Some(next) {
            self.set_actual(next);
            self.meta_mut().status_changed_at = now;
        }
        Ok(next)
    }
}
