//! Reconcile driver: a single 30-second ticker invoking the sync,
//! propagate, and remediate passes every tick, and the job synchroniser
//! every Nth tick. Runs only while this replica holds the leader lease.

use std::sync::Arc;

use kube::client::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use owo_colors::OwoColorize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::{inventory, jobs, propagate, remediate, snapshot::SnapshotPublisher};
use crate::k8s::OrchestratorAdapter;
use crate::slurm::SchedulerAdapter;
use crate::util::{Error, JOB_SYNC_EVERY_N_TICKS, TICK_INTERVAL};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

#[derive(Clone)]
pub struct Config {
    pub identifier: String,
    pub namespace: String,
    pub auto_remediate: bool,
    pub scheduler_socket_path: Option<String>,
    pub leader_elect: bool,
}

/// Top-level entrypoint: contests leadership, and runs the reconcile loop
/// only while holding the lease. Mirrors the lease-renew-or-abort pattern
/// used elsewhere in this binary for single-active-replica controllers.
pub async fn run(client: Client, config: Config, shutdown: CancellationToken) -> Result<(), Error> {
    if !config.leader_elect {
        info!("{}", "leader election disabled, running unconditionally".green());
        return reconcile_loop(client, Arc::new(config), shutdown).await;
    }

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| config.namespace.clone());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("fleet-operator-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams { holder_id, lease_name: "fleet-operator-lock".to_string(), lease_ttl },
    );

    let config = Arc::new(config);
    let mut reconcile_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = reconcile_task.take() {
                    task.abort();
                    task.await.ok();
                }
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "leader election renew/acquire failed");
                if let Some(task) = reconcile_task.take() {
                    task.abort();
                }
                continue;
            }
        };

        if lease.acquired_lease {
            if reconcile_task.is_none() {
                info!("{}", "acquired leadership, starting reconcile driver".green());
                let client = client.clone();
                let config = config.clone();
                let driver_shutdown = shutdown.clone();
                reconcile_task = Some(tokio::spawn(async move {
                    if let Err(e) = reconcile_loop(client, config, driver_shutdown).await {
                        error!(error = %e, "reconcile driver exited with error");
                    }
                }));
            }
        } else if let Some(task) = reconcile_task.take() {
            warn!("lost leadership, stopping reconcile driver");
            task.abort();
        }
    }
}

async fn reconcile_loop(client: Client, config: Arc<Config>, shutdown: CancellationToken) -> Result<(), Error> {
    let orchestrator = OrchestratorAdapter::new(client);
    let scheduler = SchedulerAdapter::new(config.scheduler_socket_path.clone());
    let snapshots = SnapshotPublisher::new();
    #[cfg(feature = "metrics")]
    let metrics = ControllerMetrics::new().map_err(|e| Error::LeaderElection(e.to_string()))?;

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut tick_count: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        tick_count += 1;

        let result = run_tick(&orchestrator, &scheduler, &config, &snapshots, tick_count).await;

        #[cfg(feature = "metrics")]
        metrics.tick_counter.with_label_values(&[if result.is_ok() { "ok" } else { "error" }]).inc();

        if let Err(e) = result {
            error!(error = %e, tick = tick_count, "reconcile tick failed, continuing on next tick");
        }
    }
}

async fn run_tick(
    orchestrator: &OrchestratorAdapter,
    scheduler: &SchedulerAdapter,
    config: &Config,
    snapshots: &SnapshotPublisher,
    tick_count: u64,
) -> Result<(), Error> {
    let (sync_stats, physical_nodes) =
        inventory::sync_inventory(orchestrator, scheduler, &config.identifier, &config.namespace).await?;

    let propagate_stats = propagate::propagate_goal_state(orchestrator, &physical_nodes).await?;

    let action_count = if config.auto_remediate {
        remediate::auto_remediate(orchestrator, scheduler, &config.namespace, &physical_nodes).await?.action_count
    } else {
        0
    };

    let mut job_update_count = 0;
    if tick_count % JOB_SYNC_EVERY_N_TICKS == 0 {
        let job_stats = jobs::sync_jobs(orchestrator, scheduler, &config.namespace, &physical_nodes).await?;
        job_update_count = job_stats.update_count;

        let slurm_jobs = orchestrator.list_slurm_jobs(&config.namespace).await?;
        let physical_map = physical_nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let job_map = slurm_jobs.into_iter().filter_map(|j| j.metadata.name.clone().map(|n| (n, j))).collect();
        snapshots.publish(physical_map, job_map).await;
    }

    info!(
        update_count = sync_stats.update_count,
        tainted_count = propagate_stats.tainted_count,
        action_count,
        job_update_count,
        "reconcile tick complete"
    );
    Ok(())
}
