//! Auto-remediator: per lifecycle-tainted orchestrator node, decides and
//! performs the remediation action, under a fleet-wide per-pass budget.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use fleet_types::{GoalState, PhysicalNode};
use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use tracing::{info, warn};

use crate::constants::{
    ACTION_LIMIT_PER_PASS, GCP_MAINTENANCE_IMPENDING_TERMINATION, GCP_MAINTENANCE_STARTED, IDENTIFIER_GPU_UUID_HASH,
    NGINX_INGRESS_NAMESPACE, NODE_AGE_THRESHOLD, REASON_AUTO_K8S_NODE_DELETION, REASON_AUTO_K8S_NODE_DRAIN,
    REASON_AUTO_SLURM_NODE_DELETION, REMEDIATION_GRACE_WINDOW, SLURM_NAMESPACE, SLURM_TAINT_ACTION_MANUAL,
    SLURM_TAINT_ACTION_QUIT, SLURM_TAINT_ACTION_REBOOT, SLURM_TAINT_ACTION_RMA, SLURM_TAINT_GOAL_STATE,
    SLURM_TAINT_PREFIX, SYSTEM_NAMESPACE,
};
use crate::core::events::emit_deduplicated;
use crate::k8s::{physical_node_name, OrchestratorAdapter};
use crate::slurm::SchedulerAdapter;
use crate::util::Error;

pub fn is_lifecycle_taint_key(key: &str) -> bool {
    key.starts_with(SLURM_TAINT_PREFIX) || key == GCP_MAINTENANCE_STARTED || key == GCP_MAINTENANCE_IMPENDING_TERMINATION
}

#[derive(Default)]
pub struct RemediateStats {
    pub action_count: usize,
}

enum Action {
    SlurmPodKeep,
    SlurmPodDelete,
    SlurmPodRestart,
    K8sNodeKeep,
    K8sNodeDrain,
    K8sNodeDelete,
}

pub async fn auto_remediate(
    orchestrator: &OrchestratorAdapter,
    scheduler: &SchedulerAdapter,
    namespace: &str,
    physical_nodes: &HashMap<String, PhysicalNode>,
) -> Result<RemediateStats, Error> {
    let k8s_nodes = orchestrator.list_nodes().await?;
    let slurm_nodes = scheduler.list_nodes().await?;
    let slurm_by_name: HashMap<&str, &crate::slurm::types::SlurmNode> =
        slurm_nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    let slurm_pods = orchestrator.list_pods(SLURM_NAMESPACE).await?;
    let system_pods: Vec<Pod> = orchestrator
        .list_pods(SYSTEM_NAMESPACE)
        .await?
        .into_iter()
        .filter(|p| p.metadata.owner_references.as_ref().is_some_and(|o| o.first().is_some_and(|o| o.kind == "ReplicaSet")))
        .collect();
    let ingress_pods = orchestrator.list_pods(NGINX_INGRESS_NAMESPACE).await?;

    let pod_lists: [(&str, &Vec<Pod>); 3] =
        [(SLURM_NAMESPACE, &slurm_pods), (SYSTEM_NAMESPACE, &system_pods), (NGINX_INGRESS_NAMESPACE, &ingress_pods)];

    let physical_by_k8s_name: HashMap<&str, &PhysicalNode> = physical_nodes
        .values()
        .filter_map(|p| {
            let name = p.status.as_ref().map(|s| s.k8s_node_status.name.as_str()).unwrap_or("");
            (!name.is_empty()).then_some((name, p))
        })
        .collect();

    let mut stats = RemediateStats::default();
    let now = Utc::now();

    'nodes: for node in &k8s_nodes {
        let Some(node_name) = node.metadata.name.as_deref() else { continue };
        let Some(lifecycle_taint) = node
            .spec
            .as_ref()
            .and_then(|s| s.taints.as_ref())
            .and_then(|taints| taints.iter().find(|t| is_lifecycle_taint_key(&t.key)))
        else {
            continue;
        };

        let physical_id = match physical_node_name(node, IDENTIFIER_GPU_UUID_HASH) {
            Ok(id) if !id.is_empty() => id,
            _ => {
                if !node_name.contains("cpu") {
                    warn!(node = node_name, "no physical host name found for k8s node");
                }
                continue;
            }
        };
        let Some(physical_node) = physical_by_k8s_name.get(physical_id.as_str()) else {
            warn!(node = node_name, physical_id = physical_id.as_str(), "physical node not found for k8s node");
            continue;
        };

        let mut has_pods = false;
        let mut slurm_pod: Option<&Pod> = None;
        for (_ns, pods) in &pod_lists {
            for pod in pods.iter() {
                if pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) != Some(node_name) {
                    continue;
                }
                has_pods = true;
                if let Some(name) = pod.metadata.name.as_deref() {
                    if slurm_by_name.contains_key(name) {
                        slurm_pod = Some(pod);
                        break;
                    }
                }
            }
            if slurm_pod.is_some() {
                break;
            }
        }

        let action = if let Some(pod) = slurm_pod {
            let pod_name = pod.metadata.name.clone().unwrap_or_default();
            let slurm_state = &slurm_by_name[pod_name.as_str()].state;
            if lifecycle_taint.key == SLURM_TAINT_GOAL_STATE {
                let goal_state = physical_node.spec.slurm_node_spec.goal_state;
                let in_terminal_state = slurm_state.iter().any(|s| {
                    (s.eq_ignore_ascii_case("DOWN") && goal_state == GoalState::Down)
                        || (s.eq_ignore_ascii_case("DRAIN") && goal_state == GoalState::Drain)
                });
                let within_grace = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.start_time.as_ref())
                    .is_some_and(|t| now.signed_duration_since(t.0) < ChronoDuration::from_std(REMEDIATION_GRACE_WINDOW).unwrap());
                if in_terminal_state && within_grace { Action::SlurmPodKeep } else { Action::SlurmPodDelete }
            } else if lifecycle_taint.key == SLURM_TAINT_ACTION_QUIT {
                Action::SlurmPodRestart
            } else if [SLURM_TAINT_ACTION_REBOOT, SLURM_TAINT_ACTION_MANUAL, SLURM_TAINT_ACTION_RMA].contains(&lifecycle_taint.key.as_str())
            {
                Action::SlurmPodDelete
            } else if lifecycle_taint.key == GCP_MAINTENANCE_STARTED || lifecycle_taint.key == GCP_MAINTENANCE_IMPENDING_TERMINATION {
                Action::K8sNodeKeep
            } else {
                Action::SlurmPodDelete
            }
        } else if lifecycle_taint.key == SLURM_TAINT_ACTION_QUIT {
            Action::SlurmPodRestart
        } else if has_pods || !node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false) {
            Action::K8sNodeDrain
        } else if node_age(node, now) < ChronoDuration::from_std(NODE_AGE_THRESHOLD).unwrap() {
            Action::K8sNodeKeep
        } else {
            Action::K8sNodeDelete
        };

        if matches!(action, Action::SlurmPodKeep | Action::K8sNodeKeep) {
            continue;
        }

        if stats.action_count >= ACTION_LIMIT_PER_PASS {
            warn!(limit = ACTION_LIMIT_PER_PASS, "reached remediation action budget, stopping this pass");
            break 'nodes;
        }

        let (reason, message) = match &action {
            Action::SlurmPodRestart => {
                if let Some(pod) = slurm_pod {
                    delete_pod(orchestrator, pod).await?;
                }
                remove_taint(orchestrator, node, lifecycle_taint).await?;
                (REASON_AUTO_SLURM_NODE_DELETION, format!("auto untainted k8s node {node_name}"))
            }
            Action::SlurmPodDelete => {
                if let Some(pod) = slurm_pod {
                    delete_pod(orchestrator, pod).await?;
                }
                (REASON_AUTO_SLURM_NODE_DELETION, format!("auto removed slurm pod on k8s node {node_name}"))
            }
            Action::K8sNodeDrain => {
                drain_node(orchestrator, node).await?;
                for (_ns, pods) in &pod_lists {
                    for pod in pods.iter() {
                        if pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name) {
                            delete_pod(orchestrator, pod).await?;
                        }
                    }
                }
                (REASON_AUTO_K8S_NODE_DRAIN, format!("auto drained k8s node {node_name}"))
            }
            Action::K8sNodeDelete => {
                orchestrator.delete_node(node_name).await?;
                (REASON_AUTO_K8S_NODE_DELETION, format!("auto deleted k8s node {node_name}"))
            }
            _ => unreachable!("keep actions were filtered above"),
        };

        let to_persist = (*physical_node).clone();
        let mut status = to_persist.status.clone().unwrap_or_default();
        let uid = to_persist.metadata.uid.clone().unwrap_or_default();
        emit_deduplicated(orchestrator, namespace, &mut status, &physical_id, &uid, reason, &message).await?;
        orchestrator.update_physical_node_status(&to_persist, status).await?;

        stats.action_count += 1;
    }

    info!(action_count = stats.action_count, "auto-remediation pass complete");
    Ok(stats)
}

fn node_age(node: &Node, now: chrono::DateTime<Utc>) -> ChronoDuration {
    node.metadata
        .creation_timestamp
        .as_ref()
        .map(|t| now.signed_duration_since(t.0))
        .unwrap_or(ChronoDuration::zero())
}

async fn delete_pod(orchestrator: &OrchestratorAdapter, pod: &Pod) -> Result<(), Error> {
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let uid = pod.metadata.uid.as_deref().unwrap_or_default();
    orchestrator.delete_pod(namespace, name, uid).await?;
    Ok(())
}

async fn drain_node(orchestrator: &OrchestratorAdapter, node: &Node) -> Result<(), Error> {
    let mut copy = node.clone();
    copy.spec.get_or_insert_with(Default::default).unschedulable = Some(true);
    orchestrator.update_node(&copy).await?;
    Ok(())
}

async fn remove_taint(orchestrator: &OrchestratorAdapter, node: &Node, taint: &Taint) -> Result<(), Error> {
    let mut copy = node.clone();
    if let Some(taints) = copy.spec.get_or_insert_with(Default::default).taints.as_mut() {
        taints.retain(|t| !(t.key == taint.key && t.value == taint.value && t.effect == taint.effect));
    }
    orchestrator.update_node(&copy).await?;
    Ok(())
}
