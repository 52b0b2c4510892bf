use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, Taint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Desired scheduler disposition for one side of a physical host pairing.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GoalState {
    #[default]
    Init,
    Up,
    Drain,
    Down,
}

impl FromStr for GoalState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(GoalState::Init),
            "up" => Ok(GoalState::Up),
            "drain" => Ok(GoalState::Drain),
            "down" => Ok(GoalState::Down),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalState::Init => write!(f, "init"),
            GoalState::Up => write!(f, "up"),
            GoalState::Drain => write!(f, "drain"),
            GoalState::Down => write!(f, "down"),
        }
    }
}

/// Two values are semantically equal for upsert purposes even when bookkeeping
/// fields like timestamps differ. Mirrors the field subset each record type's
/// store actually persists on.
pub trait IsEqual {
    fn is_equal(&self, other: &Self) -> bool;
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SlurmNodeSpec {
    #[serde(rename = "goalState")]
    pub goal_state: GoalState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IsEqual for SlurmNodeSpec {
    fn is_equal(&self, other: &Self) -> bool {
        self.goal_state == other.goal_state && self.reason == other.reason
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SlurmNodeStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,

    #[serde(default)]
    pub removed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IsEqual for SlurmNodeStatus {
    fn is_equal(&self, other: &Self) -> bool {
        self.name == other.name
            && self.state == other.state
            && self.features == other.features
            && self.reason == other.reason
            && self.comment == other.comment
            && self.removed == other.removed
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct K8sNodeSpec {
    #[serde(rename = "goalState")]
    pub goal_state: GoalState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IsEqual for K8sNodeSpec {
    fn is_equal(&self, other: &Self) -> bool {
        self.goal_state == other.goal_state && self.reason == other.reason
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct K8sNodeStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub unschedulable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,

    #[serde(default)]
    pub removed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IsEqual for K8sNodeStatus {
    fn is_equal(&self, other: &Self) -> bool {
        if self.name != other.name || self.unschedulable != other.unschedulable || self.removed != other.removed {
            return false;
        }
        if self.taints.len() != other.taints.len() {
            return false;
        }
        // Order-independent: index self's taints by key, then require every
        // taint in `other` to match one by key+value+effect.
        let by_key: HashMap<&str, &Taint> =
            self.taints.iter().map(|t| (t.key.as_str(), t)).collect();
        other.taints.iter().all(|t| {
            by_key
                .get(t.key.as_str())
                .is_some_and(|mine| mine.value == t.value && mine.effect == t.effect)
        })
    }
}

/// A single audit event the core emitted or observed, kept for dedup lookback.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct EventRecord {
    #[serde(default)]
    pub event: EventSnapshot,

    #[serde(rename = "acktimestamp", default, skip_serializing_if = "Option::is_none")]
    pub ack_timestamp: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn is_from_event(&self, name: &str) -> bool {
        self.event.name == name
    }
}

/// A minimal, serializable projection of a core `v1::Event` sufficient for
/// dedup lookback. The orchestrator's own `Event` object is what actually
/// gets created; this is only what the ring needs to remember about it.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct EventSnapshot {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        EventSnapshot {
            name: event.metadata.name.clone().unwrap_or_default(),
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
        }
    }
}

pub const NODE_HISTORY_LENGTH: usize = 50;
pub const EVENT_RECORD_LENGTH: usize = 5;

/// Prepend `entry` to `history`, keeping it newest-first and truncated at
/// `NODE_HISTORY_LENGTH`.
pub fn push_history<T>(history: &mut Vec<T>, entry: T) {
    history.insert(0, entry);
    history.truncate(NODE_HISTORY_LENGTH);
}

/// Prepend an event record to the ring, keeping it newest-first and
/// truncated at `EVENT_RECORD_LENGTH`.
pub fn push_event_record(records: &mut Vec<EventRecord>, record: EventRecord) {
    records.insert(0, record);
    records.truncate(EVENT_RECORD_LENGTH);
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, JsonSchema)]
#[kube(
    group = "fleet.gpu-operator.io",
    version = "v1",
    kind = "PhysicalNode",
    plural = "physicalnodes",
    status = "PhysicalNodeStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.slurmNodeStatus.name\", \"name\": \"SLURM-NODE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.k8sNodeStatus.name\", \"name\": \"K8S-NODE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.slurmNodeSpec.goalState\", \"name\": \"GOAL-STATE\", \"type\": \"string\" }"
)]
pub struct PhysicalNodeSpec {
    #[serde(rename = "slurmNodeSpec")]
    pub slurm_node_spec: SlurmNodeSpec,

    #[serde(rename = "k8sNodeSpec")]
    pub k8s_node_spec: K8sNodeSpec,

    #[serde(default)]
    pub manual: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PhysicalNodeStatus {
    #[serde(rename = "slurmNodeStatus", default)]
    pub slurm_node_status: SlurmNodeStatus,

    #[serde(rename = "slurmNodeStatusHistory", default, skip_serializing_if = "Vec::is_empty")]
    pub slurm_node_status_history: Vec<SlurmNodeStatus>,

    #[serde(rename = "k8sNodeStatus", default)]
    pub k8s_node_status: K8sNodeStatus,

    #[serde(rename = "k8sNodeStatusHistory", default, skip_serializing_if = "Vec::is_empty")]
    pub k8s_node_status_history: Vec<K8sNodeStatus>,

    #[serde(rename = "eventRecords", default, skip_serializing_if = "Vec::is_empty")]
    pub event_records: Vec<EventRecord>,
}

impl IsEqual for PhysicalNodeSpec {
    fn is_equal(&self, other: &Self) -> bool {
        self.slurm_node_spec.is_equal(&other.slurm_node_spec)
            && self.k8s_node_spec.is_equal(&other.k8s_node_spec)
            && self.manual == other.manual
    }
}

impl IsEqual for PhysicalNodeStatus {
    fn is_equal(&self, other: &Self) -> bool {
        self.slurm_node_status.is_equal(&other.slurm_node_status)
            && self.k8s_node_status.is_equal(&other.k8s_node_status)
    }
}

/// Key used to pair a batch-scheduler job's snapshot with the physical node
/// it ran on; numeric-job-id-as-string for `SlurmJob`, scheduler node name
/// for `PhysicalNodeSnapshot`'s map.
pub type JobId = String;

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, JsonSchema)]
#[kube(
    group = "fleet.gpu-operator.io",
    version = "v1",
    kind = "SlurmJob",
    plural = "slurmjobs",
    status = "SlurmJobStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.slurmJobRunCurrentStatus.state\", \"name\": \"STATE\", \"type\": \"string\" }"
)]
pub struct SlurmJobSpec {
    #[serde(rename = "userName", default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SlurmJobStatus {
    #[serde(rename = "restartCount", default)]
    pub restart_count: i64,

    #[serde(rename = "slurmJobRunCurrentStatus", default)]
    pub current: SlurmJobRunStatus,

    #[serde(rename = "slurmJobRunStatusHistory", default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<SlurmJobRunStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SlurmJobRunStatus {
    #[serde(rename = "runID", default)]
    pub run_id: i64,

    #[serde(default)]
    pub removed: bool,

    #[serde(default)]
    pub priority: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,

    /// Keyed by the scheduler-side node name. A `BTreeMap` so serialized
    /// output is deterministic; equality between two maps must still be
    /// tested via [`IsEqual`], not `==`, so key insertion order never
    /// matters either way.
    #[serde(
        rename = "physicalNodeSnapshots",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub physical_node_snapshots: BTreeMap<String, PhysicalNodeSnapshot>,

    #[serde(rename = "submitTimestamp", default, skip_serializing_if = "Option::is_none")]
    pub submit_timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "startTimestamp", default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "lastSyncTimestamp", default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

impl IsEqual for SlurmJobRunStatus {
    fn is_equal(&self, other: &Self) -> bool {
        if self.physical_node_snapshots.len() != other.physical_node_snapshots.len() {
            return false;
        }
        let snapshots_equal = self.physical_node_snapshots.iter().all(|(k, v)| {
            other.physical_node_snapshots.get(k).is_some_and(|v2| {
                v.physical_node_name == v2.physical_node_name
                    && v.k8s_node_name == v2.k8s_node_name
                    && v.slurm_node_name == v2.slurm_node_name
            })
        });
        snapshots_equal
            && self.run_id == other.run_id
            && self.removed == other.removed
            && self.priority == other.priority
            && self.state == other.state
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PhysicalNodeSnapshot {
    #[serde(rename = "physicalNodeName", default, skip_serializing_if = "String::is_empty")]
    pub physical_node_name: String,

    #[serde(rename = "k8sNodeName", default, skip_serializing_if = "String::is_empty")]
    pub k8s_node_name: String,

    #[serde(rename = "slurmNodeName", default, skip_serializing_if = "String::is_empty")]
    pub slurm_node_name: String,

    /// Reserved: declared by the schema but never computed by the sync
    /// pass. Seconds of accumulated runtime once a roll-up is implemented.
    #[serde(rename = "accumulatedRuntime", default, skip_serializing_if = "Option::is_none")]
    pub accumulated_runtime: Option<i64>,
}

pub const JOB_HISTORY_LENGTH: usize = 10;
pub const JOB_TOTAL_LIMIT: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_state_round_trips_through_lowercase_strings() {
        for (s, g) in [
            ("init", GoalState::Init),
            ("up", GoalState::Up),
            ("drain", GoalState::Drain),
            ("down", GoalState::Down),
        ] {
            assert_eq!(GoalState::from_str(s), Ok(g));
            assert_eq!(g.to_string(), s);
        }
    }

    #[test]
    fn slurm_node_spec_is_equal_ignores_timestamp() {
        let a = SlurmNodeSpec {
            goal_state: GoalState::Drain,
            reason: "test".into(),
            timestamp: Some(Utc::now()),
        };
        let mut b = a.clone();
        b.timestamp = None;
        assert!(a.is_equal(&b));
        b.reason = "other".into();
        assert!(!a.is_equal(&b));
    }

    #[test]
    fn k8s_node_status_taints_compare_order_independently() {
        let taint_a = Taint {
            key: "a".into(),
            effect: "NoSchedule".into(),
            value: Some("1".into()),
            ..Default::default()
        };
        let taint_b = Taint {
            key: "b".into(),
            effect: "NoSchedule".into(),
            value: Some("2".into()),
            ..Default::default()
        };
        let forward = K8sNodeStatus {
            taints: vec![taint_a.clone(), taint_b.clone()],
            ..Default::default()
        };
        let reversed = K8sNodeStatus {
            taints: vec![taint_b, taint_a],
            ..Default::default()
        };
        assert!(forward.is_equal(&reversed));
    }

    #[test]
    fn slurm_job_run_status_is_equal_ignores_snapshot_order_and_accumulated_runtime() {
        let mut a = SlurmJobRunStatus {
            run_id: 3,
            state: "RUNNING".into(),
            ..Default::default()
        };
        a.physical_node_snapshots.insert(
            "node-1".into(),
            PhysicalNodeSnapshot {
                physical_node_name: "phys-1".into(),
                k8s_node_name: "k8s-1".into(),
                slurm_node_name: "node-1".into(),
                accumulated_runtime: None,
            },
        );
        a.physical_node_snapshots.insert(
            "node-2".into(),
            PhysicalNodeSnapshot {
                physical_node_name: "phys-2".into(),
                k8s_node_name: "k8s-2".into(),
                slurm_node_name: "node-2".into(),
                accumulated_runtime: Some(42),
            },
        );

        let mut b = a.clone();
        // Different BTreeMap insertion order, different reserved field value.
        b.physical_node_snapshots.get_mut("node-2").unwrap().accumulated_runtime = Some(99);
        assert!(a.is_equal(&b));

        b.state = "COMPLETED".into();
        assert!(!a.is_equal(&b));
    }

    #[test]
    fn push_history_truncates_at_cap() {
        let mut history: Vec<i32> = Vec::new();
        for i in 0..(NODE_HISTORY_LENGTH + 5) {
            push_history(&mut history, i as i32);
        }
        assert_eq!(history.len(), NODE_HISTORY_LENGTH);
        // Newest-first.
        assert_eq!(history[0], (NODE_HISTORY_LENGTH + 4) as i32);
    }
}
