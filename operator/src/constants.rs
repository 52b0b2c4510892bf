//! Reserved annotation/taint keys, namespaces and rate limits. These are the
//! fixed vocabulary two independently-evolving views (scheduler, cluster)
//! agree to speak through.

pub const SLURM_NAMESPACE: &str = "slurm";
pub const SYSTEM_NAMESPACE: &str = "kube-system";
pub const NGINX_INGRESS_NAMESPACE: &str = "ingress-nginx";

pub const IDENTIFIER_GPU_UUID_HASH: &str = "gpu-uuid-hash";
pub const IDENTIFIER_PHYSICAL_HOST: &str = "physical-host";

const ORG: &str = "fleet.gpu-operator.io";

pub const PHYSICAL_HOST_ANNOTATION: &str = const_format::concatcp!(ORG, "/physical-host");
pub const GPU_UUID_HASH_ANNOTATION: &str = const_format::concatcp!(ORG, "/gpu-uuid-hash");
pub const K8S_GOAL_STATE_ANNOTATION: &str = const_format::concatcp!(ORG, "/k8s-goal-state");
pub const SLURM_GOAL_STATE_ANNOTATION: &str = const_format::concatcp!(ORG, "/slurm-goal-state");
pub const SLURM_REASON_ANNOTATION: &str = const_format::concatcp!(ORG, "/slurm-reason");

pub const SLURM_TAINT_PREFIX: &str = const_format::concatcp!(ORG, "/");
pub const SLURM_TAINT_GOAL_STATE: &str = const_format::concatcp!(ORG, "/slurm-goal-state");
pub const SLURM_TAINT_ACTION_QUIT: &str = const_format::concatcp!(ORG, "/action-quit");
pub const SLURM_TAINT_ACTION_REBOOT: &str = const_format::concatcp!(ORG, "/action-reboot");
pub const SLURM_TAINT_ACTION_MANUAL: &str = const_format::concatcp!(ORG, "/action-manual");
pub const SLURM_TAINT_ACTION_RMA: &str = const_format::concatcp!(ORG, "/action-rma");

/// External maintenance-vendor taint keys the remediator must also treat as
/// lifecycle taints, even though they live outside our reserved prefix.
pub const GCP_MAINTENANCE_STARTED: &str = "cloud.google.com/maintenance-window-started";
pub const GCP_MAINTENANCE_IMPENDING_TERMINATION: &str = "cloud.google.com/impending-node-termination";

pub const NODE_HISTORY_LENGTH: usize = fleet_types::NODE_HISTORY_LENGTH;
pub const JOB_HISTORY_LENGTH: usize = fleet_types::JOB_HISTORY_LENGTH;
pub const JOB_TOTAL_LIMIT: usize = fleet_types::JOB_TOTAL_LIMIT;

pub const TAINT_LIMIT_PER_ITERATION: usize = 100;
pub const TAINT_LIMIT_TOTAL: usize = 100;
pub const ACTION_LIMIT_PER_PASS: usize = 30;

pub const REASON_AUTO_SLURM_NODE_DELETION: &str = "SlonkletAutoSlurmNodeDeletion";
pub const REASON_AUTO_K8S_NODE_DRAIN: &str = "SlonkletAutoK8sNodeDrain";
pub const REASON_AUTO_K8S_NODE_DELETION: &str = "SlonkletAutoK8sNodeDeletion";
pub const REASON_UNEXPECTED_SLURM_NODE_DELETION: &str = "SlonkletUnexpectedSlurmNodeDeletion";
pub const REASON_UNEXPECTED_K8S_NODE_DELETION: &str = "SlonkletUnexpectedK8sNodeDeletion";

/// Reasons that never count as a manual human drain request, even though
/// they carry a non-empty reason string and a `DRAIN` state.
pub const PROTECTED_DRAIN_REASONS: &[&str] = &[
    "reboot",
    "reboot ASAP",
    "Reboot ASAP",
    "reboot requested",
    "Not responding",
    "Kill task failed",
    "failed_health_check",
];

pub const PROTECTED_DRAIN_REASON_PREFIXES: &[&str] = &["Init error", "Epilog error", "Prolog error"];

/// Pod grace window before a `slurm-goal-state` lifecycle taint forces a
/// pod deletion.
pub const REMEDIATION_GRACE_WINDOW: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Minimum node age before an empty, unschedulable node is eligible for
/// deletion.
pub const NODE_AGE_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(15 * 60);

/// Dedup lookback window for audit events.
pub const EVENT_DEDUP_WINDOW: std::time::Duration = std::time::Duration::from_secs(60 * 60);
