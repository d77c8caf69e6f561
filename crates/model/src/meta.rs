//! Row bookkeeping shared by every persisted entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The last action the reconciler claimed for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    Assign,
    Update,
    Delete,
    Deprovision,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assign => "assign",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Deprovision => "deprovision",
        })
    }
}

/// Versioning, timestamps and reconciliation markers for a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    /// Optimistic-concurrency counter; bumped by exactly one per write.
    pub resource_version: u64,
    /// Highest agent-side version accepted for this row.
    pub reported_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    pub desired_changed_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub pending: Option<PendingAction>,
    /// When `pending` was claimed.
    #[serde(default)]
    pub pending_since: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl RowMeta {
    /// Bookkeeping for a row that has not been stored yet.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            resource_version: 0,
            reported_version: 0,
            created_at: now,
            updated_at: now,
            status_changed_at: now,
            desired_changed_at: now,
            deleted_at: None,
            pending: None,
            pending_since: None,
            failure_reason: None,
        }
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The latest status change, desired change or claim.
    pub fn last_activity(&self) -> DateTime<Utc> {
        let changed = self.status_changed_at.max(self.desired_changed_at);
        self.pending_since.map_or(changed, |claimed| claimed.max(changed))
    }

    /// How long the row has gone without progress.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_activity())
    }

    /// Record that `action` was handed to the agent at `now`.
    pub fn claim(&mut self, action: PendingAction, now: DateTime<Utc>) {
        self.pending = Some(action);
        self.pending_since = Some(now);
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.pending_since = None;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.clear_pending();
    }

    pub fn mark_desired_changed(&mut self, now: DateTime<Utc>) {
        self.desired_changed_at = now;
        self.clear_pending();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_idle_uses_latest_change() {
        let start = Utc::now();
        let mut meta = RowMeta::new(start);
        meta.desired_changed_at = start + Duration::seconds(60);

        let now = start + Duration::seconds(100);
        assert_eq!(meta.idle_for(now), Duration::seconds(40));
    }

    #[test]
    fn test_claim_counts_as_activity() {
        let start = Utc::now();
        let mut meta = RowMeta::new(start);
        meta.claim(PendingAction::Delete, start + Duration::seconds(300));

        let now = start + Duration::seconds(400);
        assert_eq!(meta.idle_for(now), Duration::seconds(100));

        meta.clear_pending();
        assert_eq!(meta.idle_for(now), Duration::seconds(400));
    }

    #[test]
    fn test_soft_delete_clears_pending() {
        let now = Utc::now();
        let mut meta = RowMeta::new(now);
        meta.claim(PendingAction::Delete, now);

        meta.soft_delete(now);

        assert!(meta.is_deleted());
        assert_eq!(meta.pending, None);
        assert_eq!(meta.pending_since, None);
    }
}
