//! Lock-protected publication of the two maps the reconciler holds, for
//! any narrow read-only collaborator that wants a consistent copy. Not an
//! HTTP server: a caller embedding an HTTP endpoint reads through
//! `snapshot()`, which clones under the read lock before returning.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_types::{PhysicalNode, SlurmJob};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Snapshot {
    physical_nodes: BTreeMap<String, PhysicalNode>,
    slurm_jobs: BTreeMap<String, SlurmJob>,
}

/// Shared handle; cheap to clone, safe to hand to a collaborator that only
/// ever reads.
#[derive(Clone, Default)]
pub struct SnapshotPublisher {
    inner: Arc<RwLock<Snapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, physical_nodes: BTreeMap<String, PhysicalNode>, slurm_jobs: BTreeMap<String, SlurmJob>) {
        let mut guard = self.inner.write().await;
        guard.physical_nodes = physical_nodes;
        guard.slurm_jobs = slurm_jobs;
    }

    pub async fn physical_nodes(&self) -> BTreeMap<String, PhysicalNode> {
        self.inner.read().await.physical_nodes.clone()
    }

    pub async fn slurm_jobs(&self) -> BTreeMap<String, SlurmJob> {
        self.inner.read().await.slurm_jobs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_replaces_prior_snapshot() {
        let publisher = SnapshotPublisher::new();
        let mut nodes = BTreeMap::new();
        nodes.insert("phys-1".to_string(), PhysicalNode::new("phys-1", Default::default()));
        publisher.publish(nodes, BTreeMap::new()).await;
        assert_eq!(publisher.physical_nodes().await.len(), 1);
        assert!(publisher.slurm_jobs().await.is_empty());

        publisher.publish(BTreeMap::new(), BTreeMap::new()).await;
        assert!(publisher.physical_nodes().await.is_empty());
    }
}
