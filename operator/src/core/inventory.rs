//! Inventory synchroniser: joins the batch-scheduler view and the
//! orchestrator view into the PhysicalNode record set.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use fleet_types::{
    push_history, GoalState, IsEqual, K8sNodeSpec, K8sNodeStatus, PhysicalNode, PhysicalNodeSpec, PhysicalNodeStatus,
    SlurmNodeSpec, SlurmNodeStatus,
};
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::{info, warn};

use crate::constants::{
    PROTECTED_DRAIN_REASONS, PROTECTED_DRAIN_REASON_PREFIXES, REASON_AUTO_K8S_NODE_DELETION,
    REASON_AUTO_SLURM_NODE_DELETION, REASON_UNEXPECTED_K8S_NODE_DELETION, REASON_UNEXPECTED_SLURM_NODE_DELETION,
};
use crate::core::events::emit_deduplicated;
use crate::k8s::{physical_node_name, OrchestratorAdapter};
use crate::slurm::SchedulerAdapter;
use crate::util::Error;

#[derive(Default)]
pub struct SyncStats {
    pub update_count: usize,
}

struct Fresh {
    slurm: SlurmNodeStatus,
    k8s: K8sNodeStatus,
}

/// One pass of the inventory synchroniser. Returns the refreshed PhysicalNode
/// map (callers use it to run the goal-state propagator and remediator
/// against a view consistent with what was just written).
pub async fn sync_inventory(
    orchestrator: &OrchestratorAdapter,
    scheduler: &SchedulerAdapter,
    identifier: &str,
    namespace: &str,
) -> Result<(SyncStats, HashMap<String, PhysicalNode>), Error> {
    let now = Utc::now();
    let slurm_nodes = scheduler.list_nodes().await?;
    let pods = orchestrator.list_pods(namespace).await?;
    let k8s_nodes = orchestrator.list_nodes().await?;
    let existing = orchestrator.list_physical_nodes(namespace).await?;

    let pods_by_name: HashMap<&str, &Pod> = pods
        .iter()
        .filter_map(|p| p.metadata.name.as_deref().map(|n| (n, p)))
        .collect();
    let k8s_nodes_by_name: HashMap<&str, &Node> = k8s_nodes
        .iter()
        .filter_map(|n| n.metadata.name.as_deref().map(|name| (name, n)))
        .collect();
    let mut existing_by_id: HashMap<String, PhysicalNode> = existing
        .into_iter()
        .filter_map(|p| p.metadata.name.clone().map(|n| (n, p)))
        .collect();

    let mut fresh: HashMap<String, Fresh> = HashMap::new();
    let mut matched_k8s_names: HashSet<String> = HashSet::new();

    for slurm_node in &slurm_nodes {
        let Some(pod) = pods_by_name.get(slurm_node.name.as_str()) else { continue };
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else { continue };
        let Some(node) = k8s_nodes_by_name.get(node_name.as_str()) else { continue };
        let physical_id = match physical_node_name(node, identifier) {
            Ok(id) => id,
            Err(e) => {
                warn!(node = node_name, error = %e, "skipping node with invalid physical identifier");
                continue;
            }
        };
        matched_k8s_names.insert(node_name.clone());
        fresh.insert(
            physical_id,
            Fresh {
                slurm: SlurmNodeStatus {
                    name: slurm_node.name.clone(),
                    state: slurm_node.state.clone(),
                    features: slurm_node.features.clone(),
                    reason: slurm_node.reason.clone(),
                    comment: slurm_node.comment.clone(),
                    removed: false,
                    timestamp: Some(now),
                },
                k8s: node_to_status(node, node_name, now),
            },
        );
    }

    for node in &k8s_nodes {
        let Some(node_name) = node.metadata.name.clone() else { continue };
        if matched_k8s_names.contains(&node_name) {
            continue;
        }
        let physical_id = match physical_node_name(node, identifier) {
            Ok(id) => id,
            Err(_) => continue,
        };
        fresh.entry(physical_id).or_insert_with(|| Fresh {
            slurm: SlurmNodeStatus { removed: true, timestamp: Some(now), ..Default::default() },
            k8s: node_to_status(node, node_name, now),
        });
    }

    let mut stats = SyncStats::default();

    for (physical_id, fresh_status) in fresh.drain() {
        match existing_by_id.remove(&physical_id) {
            None => {
                let spec = compute_spec(None, &fresh_status.slurm);
                let mut cr = PhysicalNode::new(&physical_id, spec);
                cr.metadata.namespace = Some(namespace.to_string());
                let created = orchestrator.create_physical_node(namespace, &cr).await?;
                let mut status = PhysicalNodeStatus::default();
                status.slurm_node_status = fresh_status.slurm;
                status.k8s_node_status = fresh_status.k8s;
                let updated = orchestrator.update_physical_node_status(&created, status).await?;
                existing_by_id.insert(physical_id, updated);
                stats.update_count += 1;
            }
            Some(mut current) => {
                let new_spec = compute_spec(Some(&current.spec), &fresh_status.slurm);
                let mut spec_changed = false;
                if !current.spec.is_equal(&new_spec) {
                    current.spec = new_spec;
                    spec_changed = true;
                }

                let mut status = current.status.clone().unwrap_or_default();
                let delta = merge_status(&mut status, fresh_status.slurm, fresh_status.k8s);

                if spec_changed {
                    current = orchestrator.update_physical_node(&current).await?;
                    stats.update_count += 1;
                }
                if delta.changed {
                    emit_removal_events(orchestrator, namespace, &current, &mut status, &delta).await?;
                    current = orchestrator.update_physical_node_status(&current, status).await?;
                    stats.update_count += 1;
                }
                existing_by_id.insert(physical_id, current);
            }
        }
    }

    // Everything left in `existing_by_id` was not produced this pass: mark
    // both sides removed, if not already.
    for (_id, current) in existing_by_id.iter_mut() {
        let mut status = current.status.clone().unwrap_or_default();
        let fresh_slurm = SlurmNodeStatus { removed: true, timestamp: Some(now), ..Default::default() };
        let fresh_k8s = K8sNodeStatus { removed: true, timestamp: Some(now), ..Default::default() };
        let delta = merge_status(&mut status, fresh_slurm, fresh_k8s);
        if delta.changed {
            emit_removal_events(orchestrator, namespace, current, &mut status, &delta).await?;
            *current = orchestrator.update_physical_node_status(current, status).await?;
            stats.update_count += 1;
        }
    }

    info!(update_count = stats.update_count, "inventory sync pass complete");
    Ok((stats, existing_by_id))
}

fn node_to_status(node: &Node, name: String, now: chrono::DateTime<Utc>) -> K8sNodeStatus {
    K8sNodeStatus {
        name,
        unschedulable: node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false),
        taints: node.spec.as_ref().and_then(|s| s.taints.clone()).unwrap_or_default(),
        removed: false,
        timestamp: Some(now),
    }
}

#[derive(Default)]
struct StatusDelta {
    changed: bool,
    removed_slurm_name: Option<String>,
    removed_k8s_name: Option<String>,
}

/// Apply the status-change rule for both sides: push the previous value
/// into history on observed change, and capture the prior name when a side
/// transitions into `removed` for event classification.
fn merge_status(status: &mut PhysicalNodeStatus, fresh_slurm: SlurmNodeStatus, fresh_k8s: K8sNodeStatus) -> StatusDelta {
    let mut delta = StatusDelta::default();

    if !status.slurm_node_status.is_equal(&fresh_slurm) {
        if !status.slurm_node_status.removed && fresh_slurm.removed {
            delta.removed_slurm_name = Some(status.slurm_node_status.name.clone());
        }
        push_history(&mut status.slurm_node_status_history, status.slurm_node_status.clone());
        status.slurm_node_status = fresh_slurm;
        delta.changed = true;
    }

    if !status.k8s_node_status.is_equal(&fresh_k8s) {
        if !status.k8s_node_status.removed && fresh_k8s.removed {
            delta.removed_k8s_name = Some(status.k8s_node_status.name.clone());
        }
        push_history(&mut status.k8s_node_status_history, status.k8s_node_status.clone());
        status.k8s_node_status = fresh_k8s;
        delta.changed = true;
    }

    delta
}

async fn emit_removal_events(
    orchestrator: &OrchestratorAdapter,
    namespace: &str,
    node: &PhysicalNode,
    status: &mut PhysicalNodeStatus,
    delta: &StatusDelta,
) -> Result<(), Error> {
    let Some(physical_id) = node.metadata.name.clone() else { return Ok(()) };
    let uid = node.metadata.uid.clone().unwrap_or_default();
    let down = node.spec.slurm_node_spec.goal_state == GoalState::Down;

    if let Some(removed_name) = &delta.removed_slurm_name {
        let reason = if down { REASON_AUTO_SLURM_NODE_DELETION } else { REASON_UNEXPECTED_SLURM_NODE_DELETION };
        emit_deduplicated(
            orchestrator,
            namespace,
            status,
            &physical_id,
            &uid,
            reason,
            &format!("batch-scheduler node {removed_name} no longer reported"),
        )
        .await?;
    }
    if let Some(removed_name) = &delta.removed_k8s_name {
        let reason = if down { REASON_AUTO_K8S_NODE_DELETION } else { REASON_UNEXPECTED_K8S_NODE_DELETION };
        emit_deduplicated(
            orchestrator,
            namespace,
            status,
            &physical_id,
            &uid,
            reason,
            &format!("orchestrator node {removed_name} no longer reported"),
        )
        .await?;
    }
    Ok(())
}

/// Spec computation rule: manual freezes Spec unchanged; otherwise default
/// to `up`/`up` carrying prior reasons, with manual-drain detection promoting
/// a live external drain request to a sticky `drain` goal state.
fn compute_spec(existing: Option<&PhysicalNodeSpec>, slurm_status: &SlurmNodeStatus) -> PhysicalNodeSpec {
    if let Some(existing) = existing {
        if existing.manual {
            return existing.clone();
        }
    }

    let mut spec = PhysicalNodeSpec {
        slurm_node_spec: SlurmNodeSpec {
            goal_state: GoalState::Up,
            reason: existing.map(|e| e.slurm_node_spec.reason.clone()).unwrap_or_default(),
            timestamp: existing.and_then(|e| e.slurm_node_spec.timestamp),
        },
        k8s_node_spec: K8sNodeSpec {
            goal_state: GoalState::Up,
            reason: existing.map(|e| e.k8s_node_spec.reason.clone()).unwrap_or_default(),
            timestamp: existing.and_then(|e| e.k8s_node_spec.timestamp),
        },
        manual: false,
    };

    let reason = &slurm_status.reason;
    let protected = PROTECTED_DRAIN_REASONS.contains(&reason.as_str())
        || PROTECTED_DRAIN_REASON_PREFIXES.iter().any(|p| reason.starts_with(p));
    let draining = slurm_status.state.iter().any(|s| s == "DRAIN");
    let rebooting = slurm_status.state.iter().any(|s| s == "REBOOT_REQUESTED" || s == "REBOOT_ISSUED");

    if !reason.is_empty() && !protected && draining && !rebooting {
        spec.slurm_node_spec.goal_state = GoalState::Drain;
        if spec.slurm_node_spec.reason.is_empty() {
            spec.slurm_node_spec.reason = reason.clone();
        }
        spec.manual = true;
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_spec_is_returned_unchanged() {
        let existing = PhysicalNodeSpec {
            manual: true,
            slurm_node_spec: SlurmNodeSpec { goal_state: GoalState::Down, reason: "frozen".into(), timestamp: None },
            ..Default::default()
        };
        let status = SlurmNodeStatus { reason: "anything".into(), state: vec!["DRAIN".into()], ..Default::default() };
        let got = compute_spec(Some(&existing), &status);
        assert_eq!(got.slurm_node_spec.goal_state, GoalState::Down);
        assert_eq!(got.slurm_node_spec.reason, "frozen");
    }

    #[test]
    fn default_spec_is_up_up() {
        let status = SlurmNodeStatus::default();
        let got = compute_spec(None, &status);
        assert_eq!(got.slurm_node_spec.goal_state, GoalState::Up);
        assert_eq!(got.k8s_node_spec.goal_state, GoalState::Up);
        assert!(!got.manual);
    }

    #[test]
    fn unprotected_drain_reason_sets_manual_drain() {
        let status = SlurmNodeStatus {
            reason: "hardware failure".into(),
            state: vec!["DRAIN".into()],
            ..Default::default()
        };
        let got = compute_spec(None, &status);
        assert_eq!(got.slurm_node_spec.goal_state, GoalState::Drain);
        assert!(got.manual);
        assert_eq!(got.slurm_node_spec.reason, "hardware failure");
    }

    #[test]
    fn protected_reason_does_not_trigger_manual_drain() {
        let status = SlurmNodeStatus { reason: "reboot ASAP".into(), state: vec!["DRAIN".into()], ..Default::default() };
        let got = compute_spec(None, &status);
        assert_eq!(got.slurm_node_spec.goal_state, GoalState::Up);
        assert!(!got.manual);
    }

    #[test]
    fn reboot_in_progress_does_not_trigger_manual_drain() {
        let status = SlurmNodeStatus {
            reason: "operator requested".into(),
            state: vec!["DRAIN".into(), "REBOOT_ISSUED".into()],
            ..Default::default()
        };
        let got = compute_spec(None, &status);
        assert_eq!(got.slurm_node_spec.goal_state, GoalState::Up);
        assert!(!got.manual);
    }

    #[test]
    fn protected_prefix_does_not_trigger_manual_drain() {
        let status = SlurmNodeStatus { reason: "Prolog error: disk full".into(), state: vec!["DRAIN".into()], ..Default::default() };
        let got = compute_spec(None, &status);
        assert!(!got.manual);
    }
}
