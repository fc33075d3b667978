//! Code redemption API endpoint.
//!
//! The HTTP counterpart of the one-shot CLI: one request redeems one code
//! and returns the same JSON object the CLI prints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use turnstile_core::{Redemption, ValidationResponse};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the codes router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/redeem", post(redeem_code))
}

/// Request body for redeeming a code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "code": "ABC123" }))]
pub struct RedeemRequest {
    /// The scanned access code.
    #[schema(example = "ABC123")]
    pub code: String,
}

/// Redeem a single-use access code.
#[utoipa::path(
    post,
    path = "/api/codes/redeem",
    tag = "codes",
    operation_id = "redeemCode",
    summary = "Redeem an access code",
    description = "Validates and consumes a single-use access code. An accepted \
        code updates the hourly stats and the occupancy roster. Rejections \
        (unknown, expired, malformed, empty) are normal 200 responses with \
        `is_valid: false`; only store failures produce an error status. \
        A code that was consumed but whose follow-up updates failed is reported \
        with `is_valid: true` and `reason: downstream_failure`. A 503 with \
        `COMMIT_OUTCOME_UNKNOWN` means the consume was sent but never \
        acknowledged, so the code may already be used; redeeming it again \
        tells which.",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Redemption attempted", body = ValidationResponse),
        (status = 503, description = "Store unavailable or the consume went unacknowledged; see `details.retryable`", body = ErrorResponse)
    )
)]
pub async fn redeem_code(
    State(state): State<SharedState>,
    Json(request): Json<RedeemRequest>,
) -> ApiResult<Json<ValidationResponse>> {
    let redemption = state.orchestrator().process_code(&request.code).await;
    let response = ValidationResponse::from(&redemption);

    if let Redemption::StoreError(err) = redemption {
        return Err(ApiError::from(err));
    }

    Ok(Json(response))
}
