//! Wake-up signal from desired-state writes to the reconciliation loop.

use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable handle; every clone wakes the same waiters.
///
/// A notification fired while no loop is waiting is kept, so a write that
/// lands mid-sweep still causes one more sweep.
#[derive(Debug, Clone, Default)]
pub struct ReconcileTrigger {
    notify: Arc<Notify>,
}

impl ReconcileTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Resolves on the next (or an already stored) notification.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
