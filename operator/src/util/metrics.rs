#[cfg(feature = "metrics")]
use prometheus::{Encoder, HistogramVec, IntCounterVec, TextEncoder, opts, register_histogram_vec, register_int_counter_vec};

/// Per-tick counters and timings for the reconcile driver. Compiled in only
/// when the `metrics` feature is enabled; every call site that touches this
/// is itself feature-gated so the non-metrics build pays nothing for it.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct ControllerMetrics {
    pub tick_counter: IntCounterVec,
    pub update_counter: IntCounterVec,
    pub taint_counter: IntCounterVec,
    pub action_counter: IntCounterVec,
    pub step_duration: HistogramVec,
}

#[cfg(feature = "metrics")]
impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(ControllerMetrics {
            tick_counter: register_int_counter_vec!(
                opts!("fleet_operator_ticks_total", "reconcile ticks run"),
                &["outcome"]
            )?,
            update_counter: register_int_counter_vec!(
                opts!(
                    "fleet_operator_physical_node_updates_total",
                    "PhysicalNode create/update writes"
                ),
                &["kind"]
            )?,
            taint_counter: register_int_counter_vec!(
                opts!("fleet_operator_taints_applied_total", "lifecycle taints applied"),
                &["reason"]
            )?,
            action_counter: register_int_counter_vec!(
                opts!("fleet_operator_actions_total", "auto-remediation actions taken"),
                &["action"]
            )?,
            step_duration: register_histogram_vec!(
                "fleet_operator_step_duration_seconds",
                "wall time of each reconcile step",
                &["step"]
            )?,
        })
    }
}

#[cfg(feature = "metrics")]
async fn scrape() -> String {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf).expect("prometheus text encoding is infallible");
    String::from_utf8(buf).expect("prometheus output is always utf8")
}

/// Serve the default Prometheus registry on `/metrics`. Runs until the
/// process exits; callers spawn this on its own task.
#[cfg(feature = "metrics")]
pub async fn run_server(port: u16) {
    let router = axum::Router::new().route("/metrics", axum::routing::get(scrape));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "metrics server exited with error");
            }
        }
        Err(e) => tracing::error!(error = %e, port, "failed to bind metrics server"),
    }
}
