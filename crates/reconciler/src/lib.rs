//! Reconciliation of fleet clusters and connectors.
//!
//! The reconciler periodically:
//! 1. Takes one snapshot of the store
//! 2. Plans one [`ReconcileAction`] per live resource with [`plan`]
//! 3. Claims each non-`NoOp` action with a compare-and-swap on the version it
//!    planned against
//!
//! Losing a claim is normal when several reconcilers share a store; the loser
//! records [`ReconcileOutcome::LostRace`] and moves on.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod r#loop;
pub mod reconciler;
pub mod types;

pub use error::{Error, Result};
pub use r#loop::{LoopConfig, LoopStats, LoopStopper, ReconciliationLoop};
pub use reconciler::{plan, Reconciler, ReconcilerConfig};
pub use types::{ActionRecord, PlannedAction, ReconcileAction, ReconcileOutcome, SweepReport};
