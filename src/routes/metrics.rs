use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — current recorder snapshot in Prometheus text format.
/// Exposes the job counters and queue-depth gauge; mounted with its own
/// state so the handle never rides along in `AppState`.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
