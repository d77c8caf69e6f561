//! Desired-state persistence for the fleet control plane.
//!
//! One trait, [`DesiredStateStore`], with an in-memory backend for tests and
//! single-process runs and a SurrealDB backend for everything else.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod memory;
pub mod snapshot;
pub mod store;
pub mod surreal;
pub mod traced;

use std::sync::Arc;

use fleet_core::Result;
use fleet_core::config::StoreSettings;

pub use memory::InMemoryStore;
pub use snapshot::StoreSnapshot;
pub use store::{DesiredStateStore, Persist};
pub use surreal::{SurrealConfig, SurrealStore};
pub use traced::TracingStore;

/// Open the backend named by `settings.url`, wrapped in write logging.
pub async fn open_store(settings: &StoreSettings) -> Result<Arc<dyn DesiredStateStore>> {
    let inner: Arc<dyn DesiredStateStore> = if settings.is_memory() {
        tracing::info!("using in-memory store");
        InMemoryStore::new_arc()
    } else {
        Arc::new(SurrealStore::connect(SurrealConfig::from(settings)).await?)
    };
    Ok(Arc::new(TracingStore::new(inner)))
}
