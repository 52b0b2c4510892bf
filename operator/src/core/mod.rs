pub mod driver;
pub mod events;
pub mod inventory;
pub mod jobs;
pub mod propagate;
pub mod remediate;
pub mod snapshot;
