//! Tracing + metrics initialization.
//!
//! The formatter is the teacher's `TargetFirstFormat` (`log_format.rs`)
//! unchanged; the env-filter wiring mirrors the teacher's `init_tracer`
//! tiering by `log.level` instead of an OTEL sampler, since this spec
//! carries structured logging but not a tracing backend.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use crate::log_format::TargetFirstFormat;

/// Initialize the global `tracing` subscriber. `level` is one of
/// DEBUG/INFO/WARN/ERROR per §6's `log.level` config option; `RUST_LOG`
/// still takes precedence if set, matching `EnvFilter`'s normal behavior.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(TargetFirstFormat)
        .init();
}

/// Install the process-wide Prometheus recorder. Counters/gauges/histograms
/// registered via the `metrics` facade (stats.rs, source error counters)
/// are exported from the handle's `render()` behind a `/metrics` endpoint.
pub fn init_metrics() -> metrics_exporter_prometheus::PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// A minimal `/metrics` endpoint, ambient observability rather than the
/// out-of-scope read API (§11 Non-goals still carries logging/metrics
/// regardless of what it excludes).
pub fn metrics_router(handle: metrics_exporter_prometheus::PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}
