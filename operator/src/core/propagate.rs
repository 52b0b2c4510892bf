//! Goal-state propagator: mirrors PhysicalNode Spec onto orchestrator node
//! annotations, and appends the single `down` lifecycle taint under rate
//! limits.

use std::collections::HashMap;

use fleet_types::{GoalState, PhysicalNode};
use k8s_openapi::api::core::v1::{Node, Taint};
use tracing::{info, warn};

use crate::constants::{
    SLURM_GOAL_STATE_ANNOTATION, SLURM_REASON_ANNOTATION, SLURM_TAINT_GOAL_STATE, TAINT_LIMIT_PER_ITERATION,
    TAINT_LIMIT_TOTAL,
};
use crate::k8s::OrchestratorAdapter;
use crate::util::Error;

#[derive(Default)]
pub struct PropagateStats {
    pub tainted_count: usize,
}

pub async fn propagate_goal_state(
    orchestrator: &OrchestratorAdapter,
    physical_nodes: &HashMap<String, PhysicalNode>,
) -> Result<PropagateStats, Error> {
    let nodes = orchestrator.list_nodes().await?;
    let mut nodes_by_name: HashMap<String, Node> = nodes
        .into_iter()
        .filter_map(|n| n.metadata.name.clone().map(|name| (name, n)))
        .collect();

    let mut total_taints: usize = nodes_by_name
        .values()
        .filter(|n| has_lifecycle_taint(n))
        .count();

    let mut stats = PropagateStats::default();
    let mut per_iteration: usize = 0;
    let mut tainting_stopped = false;

    for physical_node in physical_nodes.values() {
        let node_name = &physical_node.status.as_ref().map(|s| s.k8s_node_status.name.clone()).unwrap_or_default();
        if node_name.is_empty() {
            continue;
        }
        let Some(node) = nodes_by_name.get_mut(node_name.as_str()) else {
            warn!(node = node_name.as_str(), "propagator: physical node references an unknown orchestrator node");
            continue;
        };

        let goal_state = physical_node.spec.slurm_node_spec.goal_state;
        let reason = &physical_node.spec.slurm_node_spec.reason;
        let mut changed = false;

        let annotations = node.metadata.annotations.get_or_insert_with(Default::default);
        let desired_goal_state = goal_state.to_string();
        if annotations.get(SLURM_GOAL_STATE_ANNOTATION) != Some(&desired_goal_state) {
            annotations.insert(SLURM_GOAL_STATE_ANNOTATION.to_string(), desired_goal_state);
            changed = true;
        }
        if reason.is_empty() {
            if annotations.remove(SLURM_REASON_ANNOTATION).is_some() {
                changed = true;
            }
        } else if annotations.get(SLURM_REASON_ANNOTATION) != Some(reason) {
            annotations.insert(SLURM_REASON_ANNOTATION.to_string(), reason.clone());
            changed = true;
        }

        if goal_state == GoalState::Down && !has_lifecycle_taint(node) {
            if tainting_stopped {
                // already logged once for this pass
            } else if per_iteration >= TAINT_LIMIT_PER_ITERATION || total_taints >= TAINT_LIMIT_TOTAL {
                warn!(node = node_name.as_str(), "taint rate limit reached, stopping tainting for this pass");
                tainting_stopped = true;
            } else {
                let taints = node.spec.get_or_insert_with(Default::default).taints.get_or_insert_with(Vec::new);
                taints.push(Taint {
                    key: SLURM_TAINT_GOAL_STATE.to_string(),
                    value: Some("down".to_string()),
                    effect: "NoSchedule".to_string(),
                    time_added: None,
                });
                per_iteration += 1;
                total_taints += 1;
                stats.tainted_count += 1;
                changed = true;
            }
        }

        if goal_state == GoalState::Drain {
            if let Some(status) = &physical_node.status {
                let state = &status.slurm_node_status.state;
                let verified = state.iter().any(|s| s == "DRAIN" || s == "DOWN" || s == "FUTURE");
                if !verified {
                    warn!(node = node_name.as_str(), state = ?state, "drain goal state not reflected in scheduler state");
                }
            }
        }

        if changed {
            orchestrator.update_node(node).await?;
        }
    }

    info!(tainted_count = stats.tainted_count, "goal-state propagation pass complete");
    Ok(stats)
}

fn has_lifecycle_taint(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .is_some_and(|taints| taints.iter().any(|t| crate::core::remediate::is_lifecycle_taint_key(&t.key)))
}
