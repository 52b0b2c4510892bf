//! Job synchroniser: mirrors batch-scheduler jobs into SlurmJob records with
//! bounded run history and a fleet-wide eviction policy.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use fleet_types::{
    push_history, IsEqual, PhysicalNode, PhysicalNodeSnapshot, SlurmJob, SlurmJobRunStatus, SlurmJobSpec, SlurmJobStatus,
};
use tracing::{info, warn};

use crate::constants::JOB_TOTAL_LIMIT;
use crate::k8s::OrchestratorAdapter;
use crate::slurm::{parse_host_list, SchedulerAdapter};
use crate::util::Error;

#[derive(Default)]
pub struct JobSyncStats {
    pub update_count: usize,
    pub evicted_count: usize,
}

pub async fn sync_jobs(
    orchestrator: &OrchestratorAdapter,
    scheduler: &SchedulerAdapter,
    namespace: &str,
    physical_nodes: &HashMap<String, PhysicalNode>,
) -> Result<JobSyncStats, Error> {
    let now = Utc::now();
    let jobs = scheduler.list_jobs().await?;
    let existing = orchestrator.list_slurm_jobs(namespace).await?;

    // slurmPodName (== scheduler node name) -> physicalID, skipping entries
    // whose scheduler side has already gone away.
    let slurm_pod_to_physical_id: HashMap<&str, &str> = physical_nodes
        .values()
        .filter_map(|p| {
            let status = p.status.as_ref()?;
            let name = status.slurm_node_status.name.as_str();
            (!name.is_empty()).then_some((name, p.metadata.name.as_deref().unwrap_or("")))
        })
        .collect();

    let mut existing_by_id: HashMap<String, SlurmJob> =
        existing.into_iter().filter_map(|j| j.metadata.name.clone().map(|n| (n, j))).collect();

    let mut stats = JobSyncStats::default();
    let mut seen_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

    for job in &jobs {
        let job_id = job.job_id.to_string();
        seen_ids.insert(job_id.clone());

        let host_names = match parse_host_list(&job.nodes) {
            Ok(names) => names,
            Err(e) => {
                warn!(job_id = job_id.as_str(), error = %e, "skipping job with unparsable node list");
                continue;
            }
        };

        let mut snapshots: BTreeMap<String, PhysicalNodeSnapshot> = BTreeMap::new();
        for host in host_names {
            let physical_node_name = slurm_pod_to_physical_id.get(host.as_str()).copied().unwrap_or("");
            let k8s_node_name = physical_nodes
                .get(physical_node_name)
                .and_then(|p| p.status.as_ref())
                .map(|s| s.k8s_node_status.name.clone())
                .unwrap_or_default();
            snapshots.insert(
                host.clone(),
                PhysicalNodeSnapshot {
                    physical_node_name: physical_node_name.to_string(),
                    k8s_node_name,
                    slurm_node_name: host,
                    accumulated_runtime: None,
                },
            );
        }

        let fresh = SlurmJobRunStatus {
            run_id: job.job_id,
            removed: false,
            priority: job.priority.value().unwrap_or_default(),
            state: job.job_state.clone(),
            physical_node_snapshots: snapshots,
            submit_timestamp: unix_timestamp(job.submit_time.value()),
            start_timestamp: unix_timestamp(job.start_time.value()),
            last_sync_timestamp: Some(now),
        };

        match existing_by_id.remove(&job_id) {
            None => {
                let spec = SlurmJobSpec { user_name: job.user_name.clone(), command: job.command.clone(), comment: job.comment.clone() };
                let mut cr = SlurmJob::new(&job_id, spec);
                cr.metadata.namespace = Some(namespace.to_string());
                let created = orchestrator.create_slurm_job(namespace, &cr).await?;
                let status = SlurmJobStatus { restart_count: job.restart_cnt, current: fresh, history: Vec::new() };
                let updated = orchestrator.update_slurm_job_status(&created, status).await?;
                existing_by_id.insert(job_id, updated);
                stats.update_count += 1;
            }
            Some(current) => {
                let mut status = current.status.clone().unwrap_or_default();
                if !status.current.is_equal(&fresh) {
                    push_history(&mut status.history, status.current.clone());
                    status.current = fresh;
                    status.restart_count = job.restart_cnt;
                    let updated = orchestrator.update_slurm_job_status(&current, status).await?;
                    existing_by_id.insert(job_id, updated);
                    stats.update_count += 1;
                } else {
                    existing_by_id.insert(job_id, current);
                }
            }
        }
    }

    // Jobs the scheduler no longer reports: mark removed and push history.
    for (job_id, current) in existing_by_id.iter_mut() {
        if seen_ids.contains(job_id) || current.status.as_ref().is_some_and(|s| s.current.removed) {
            continue;
        }
        let mut status = current.status.clone().unwrap_or_default();
        let mut removed_status = status.current.clone();
        removed_status.removed = true;
        removed_status.last_sync_timestamp = Some(now);
        push_history(&mut status.history, status.current.clone());
        status.current = removed_status;
        *current = orchestrator.update_slurm_job_status(current, status).await?;
        stats.update_count += 1;
    }

    stats.evicted_count = gc_removed_jobs(orchestrator, namespace, &mut existing_by_id).await?;

    info!(update_count = stats.update_count, evicted_count = stats.evicted_count, "job sync pass complete");
    Ok(stats)
}

/// Evict the oldest `removed` jobs by `lastSyncTimestamp` until the fleet is
/// back under the total cap.
async fn gc_removed_jobs(
    orchestrator: &OrchestratorAdapter,
    namespace: &str,
    jobs: &mut HashMap<String, SlurmJob>,
) -> Result<usize, Error> {
    let mut evicted = 0;
    while jobs.len() > JOB_TOTAL_LIMIT {
        let oldest = jobs
            .iter()
            .filter(|(_, j)| j.status.as_ref().is_some_and(|s| s.current.removed))
            .min_by_key(|(_, j)| j.status.as_ref().and_then(|s| s.current.last_sync_timestamp).unwrap_or(DateTime::<Utc>::MIN_UTC))
            .map(|(id, _)| id.clone());
        let Some(id) = oldest else { break };
        orchestrator.delete_slurm_job(namespace, &id).await?;
        jobs.remove(&id);
        evicted += 1;
    }
    Ok(evicted)
}

fn unix_timestamp(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(|secs| DateTime::from_timestamp(secs, 0))
}
