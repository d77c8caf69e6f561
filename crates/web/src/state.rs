//! Shared handler state.

use std::sync::Arc;

use fleet_control::{
    AgentReportIngest, DesiredStateService, NamespaceResolver, ReconcileTrigger, WorkDispatchView,
};
use fleet_core::FleetConfig;
use fleet_store::DesiredStateStore;

/// Services the handlers call into. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DesiredStateStore>,
    pub resolver: Arc<NamespaceResolver>,
    pub desired: Arc<DesiredStateService>,
    pub ingest: Arc<AgentReportIngest>,
    pub dispatch: Arc<WorkDispatchView>,
    pub trigger: ReconcileTrigger,
}

impl AppState {
    /// Wire every service over one store.
    pub fn new(
        store: Arc<dyn DesiredStateStore>,
        config: &FleetConfig,
        trigger: ReconcileTrigger,
    ) -> Self {
        let resolver = Arc::new(NamespaceResolver::new(
            store.clone(),
            config.assignment.max_connectors_per_namespace,
        ));
        let desired = Arc::new(DesiredStateService::new(
            store.clone(),
            resolver.clone(),
            trigger.clone(),
        ));
        let ingest = Arc::new(AgentReportIngest::new(store.clone(), config.ingest.max_cas_retries));
        let dispatch = Arc::new(WorkDispatchView::new(store.clone()));

        Self {
            store,
            resolver,
            desired,
            ingest,
            dispatch,
            trigger,
        }
    }
}
