//! Health check API endpoint.

use axum::extract::State;
use axum::Json;
use turnstile_core::HealthResponse;

use crate::state::SharedState;

/// Health check endpoint.
///
/// Reports the service version, the active store backend and the configured
/// facility timezone. Does not
/// touch the store itself.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Liveness check for the door controller watchdog. Answers \
        without a store round trip, so a healthy response does not imply the \
        store is reachable.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: state.orchestrator().store().backend().to_string(),
        timezone: state.config().system.timezone.clone(),
    })
}
