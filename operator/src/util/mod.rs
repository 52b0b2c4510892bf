use std::time::Duration;

pub mod metrics;
pub mod patch;

mod error;

pub use error::*;

/// Reconcile ticker period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Run the job synchroniser and publish snapshots every Nth tick.
pub const JOB_SYNC_EVERY_N_TICKS: u64 = 4;

/// Name of the orchestrator-side field manager used for server-side apply.
pub(crate) const MANAGER_NAME: &str = "fleet-operator";
