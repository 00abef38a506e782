use axum::{extract::State, response::IntoResponse};

use crate::api::AppState;

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Prometheus text exposition", body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    ([("content-type", "text/plain; version=0.0.4; charset=utf-8")], body)
}
