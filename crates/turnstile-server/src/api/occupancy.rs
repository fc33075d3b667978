//! Occupancy API endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use turnstile_core::OccupancyRecord;
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Users currently inside the facility.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OccupancyResponse {
    /// Number of users inside.
    #[schema(example = 3, minimum = 0)]
    pub count: usize,

    /// One record per present user, ordered by user id.
    pub users: Vec<OccupancyRecord>,
}

/// List everyone currently inside.
#[utoipa::path(
    get,
    path = "/api/occupancy",
    tag = "occupancy",
    operation_id = "getOccupancy",
    summary = "List users currently inside",
    responses(
        (status = 200, description = "Current roster", body = OccupancyResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn get_occupancy(State(state): State<SharedState>) -> ApiResult<Json<OccupancyResponse>> {
    let users = state.orchestrator().occupancy().list_active().await?;
    Ok(Json(OccupancyResponse {
        count: users.len(),
        users,
    }))
}
