//! Operational HTTP endpoints.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use nodecycle_metrics::Metrics;

/// Router serving `/metrics` and `/healthz`.
pub fn build_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

/// GET /metrics
async fn prometheus_metrics(State(metrics): State<Metrics>) -> impl IntoResponse {
    let body = nodecycle_metrics::render_prometheus(&metrics);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
