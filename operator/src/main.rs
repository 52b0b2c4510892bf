use clap::Parser;
use kube::client::Client;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod constants;
mod core;
mod k8s;
mod slurm;
mod util;

use constants::{IDENTIFIER_GPU_UUID_HASH, IDENTIFIER_PHYSICAL_HOST, SLURM_NAMESPACE};
use util::Error;

/// Command-line configuration for the fleet operator binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Which annotation identifies a physical host: `gpu-uuid-hash` or `physical-host`.
    #[arg(long, env = "IDENTIFIER", default_value = IDENTIFIER_GPU_UUID_HASH)]
    identifier: String,

    /// Namespace the PhysicalNode and SlurmJob resources, and the scheduler's
    /// own pods, live in.
    #[arg(long, env = "NAMESPACE", default_value = SLURM_NAMESPACE)]
    namespace: String,

    /// Whether the auto-remediator runs each tick.
    #[arg(long, env = "AUTO_REMEDIATE", default_value_t = true)]
    auto_remediate: bool,

    /// Path to the scheduler's UNIX-domain socket. Omit to fall back to the
    /// `scontrol`/`squeue` subprocess backend.
    #[arg(long, env = "SCHEDULER_SOCKET_PATH")]
    scheduler_socket_path: Option<String>,

    /// Contest a lease before running the reconcile driver.
    #[arg(long, env = "LEADER_ELECT", default_value_t = true)]
    leader_elect: bool,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

fn validate_identifier(identifier: &str) -> Result<(), Error> {
    match identifier {
        IDENTIFIER_GPU_UUID_HASH | IDENTIFIER_PHYSICAL_HOST => Ok(()),
        other => Err(Error::InvalidIdentifier(other.to_string())),
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    // Exit the whole process on any panic, on any thread: a panicked
    // reconcile task should restart the container, not limp along.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let cli = Cli::parse();
    if let Err(e) = validate_identifier(&cli.identifier) {
        error!(error = %e, "invalid identifier flag");
        std::process::exit(1);
    }

    let client = Client::try_default()
        .await
        .expect("expected a valid KUBECONFIG or in-cluster service account");

    tracing::info!("{}", "starting fleet operator".green());

    #[cfg(feature = "metrics")]
    if let Some(port) = cli.metrics_port {
        tokio::spawn(util::metrics::run_server(port));
    }

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    let config = core::driver::Config {
        identifier: cli.identifier,
        namespace: cli.namespace,
        auto_remediate: cli.auto_remediate,
        scheduler_socket_path: cli.scheduler_socket_path,
        leader_elect: cli.leader_elect,
    };

    if let Err(e) = core::driver::run(client, config, shutdown).await {
        error!(error = %e, "fleet operator exited with error");
        std::process::exit(1);
    }
}
