//! Audit event construction and ring-backed deduplication.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fleet_types::{push_event_record, EventRecord, EventSnapshot, PhysicalNodeStatus};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

use crate::constants::EVENT_DEDUP_WINDOW;
use crate::k8s::OrchestratorAdapter;
use crate::util::Error;

/// True when an existing record for this reason/name pair is still within
/// the dedup lookback window.
fn already_recorded(status: &PhysicalNodeStatus, involved_name: &str, reason: &str, now: DateTime<Utc>) -> bool {
    let window = ChronoDuration::from_std(EVENT_DEDUP_WINDOW).unwrap_or(ChronoDuration::hours(1));
    status.event_records.iter().any(|r| {
        r.event.reason == reason
            && r.event.name.starts_with(involved_name)
            && r.ack_timestamp.is_some_and(|t| now.signed_duration_since(t) < window)
    })
}

/// Emit an audit event for `involved_name`/`involved_uid` unless one was
/// already recorded for the same reason within the dedup window. On emission,
/// pushes a ring entry onto `status`. Returns whether an event was created.
pub async fn emit_deduplicated(
    orchestrator: &OrchestratorAdapter,
    namespace: &str,
    status: &mut PhysicalNodeStatus,
    involved_name: &str,
    involved_uid: &str,
    reason: &str,
    message: &str,
) -> Result<bool, Error> {
    let now = Utc::now();
    if already_recorded(status, involved_name, reason, now) {
        return Ok(false);
    }

    let nanos = now.timestamp_nanos_opt().unwrap_or_default();
    let event_name = format!("{involved_name}.{nanos:x}");
    let event = Event {
        metadata: ObjectMeta {
            name: Some(event_name),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(involved_name.to_string()),
            uid: Some(involved_uid.to_string()),
            ..Default::default()
        },
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        type_: Some("Normal".to_string()),
        source: Some(EventSource {
            component: Some("fleet-operator".to_string()),
            ..Default::default()
        }),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        count: Some(1),
        ..Default::default()
    };

    let created = orchestrator.create_event(namespace, &event).await?;
    push_event_record(
        &mut status.event_records,
        EventRecord {
            event: EventSnapshot::from(&created),
            ack_timestamp: Some(now),
        },
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, reason: &str, age: ChronoDuration, now: DateTime<Utc>) -> EventRecord {
        EventRecord {
            event: EventSnapshot { name: name.to_string(), reason: reason.to_string(), message: String::new() },
            ack_timestamp: Some(now - age),
        }
    }

    #[test]
    fn within_window_suppresses_duplicate() {
        let now = Utc::now();
        let status = PhysicalNodeStatus {
            event_records: vec![record("node-a.abc", "SlonkletAutoK8sNodeDrain", ChronoDuration::minutes(10), now)],
            ..Default::default()
        };
        assert!(already_recorded(&status, "node-a", "SlonkletAutoK8sNodeDrain", now));
    }

    #[test]
    fn outside_window_allows_reemission() {
        let now = Utc::now();
        let status = PhysicalNodeStatus {
            event_records: vec![record("node-a.abc", "SlonkletAutoK8sNodeDrain", ChronoDuration::hours(2), now)],
            ..Default::default()
        };
        assert!(!already_recorded(&status, "node-a", "SlonkletAutoK8sNodeDrain", now));
    }

    #[test]
    fn different_reason_does_not_suppress() {
        let now = Utc::now();
        let status = PhysicalNodeStatus {
            event_records: vec![record("node-a.abc", "SlonkletAutoK8sNodeDrain", ChronoDuration::minutes(1), now)],
            ..Default::default()
        };
        assert!(!already_recorded(&status, "node-a", "SlonkletAutoK8sNodeDeletion", now));
    }

    #[test]
    fn different_name_prefix_does_not_suppress() {
        let now = Utc::now();
        let status = PhysicalNodeStatus {
            event_records: vec![record("node-b.abc", "SlonkletAutoK8sNodeDrain", ChronoDuration::minutes(1), now)],
            ..Default::default()
        };
        assert!(!already_recorded(&status, "node-a", "SlonkletAutoK8sNodeDrain", now));
    }
}
