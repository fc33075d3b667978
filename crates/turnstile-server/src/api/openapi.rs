//! OpenAPI specification generation for the turnstile API.
//!
//! The generated document is served at `/api/openapi.json`, rendered by
//! Swagger UI at `/docs`, and written to the workspace root by the
//! `gen-openapi` binary for client generation on the front-desk dashboard.

use axum::Json;
use turnstile_core::{
    EventType, HealthResponse, OccupancyRecord, ResultReason, ValidationResponse, WorkoutTags,
};
use utoipa::OpenApi;

use super::codes::RedeemRequest;
use super::error::ErrorResponse;
use super::occupancy::OccupancyResponse;
use super::stats::{DayStatsResponse, HourlyStatsResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for turnstile.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "turnstile API",
        version = "0.1.0",
        description = r#"
# turnstile API

turnstile controls entry to and exit from a facility with single-use, time-limited access codes.

## Overview

This API runs next to the door controller and provides:

1. **Redemption**: Validate and consume a scanned code. Each code works exactly once.
2. **Hourly stats**: Entry and exit counts per UTC hour.
3. **Occupancy**: Who is inside right now.

## Result reasons

`POST /api/codes/redeem` always answers with the same object the command-line
validator prints. `reason` is one of `accepted`, `empty_input`, `not_found`,
`malformed`, `expired`, `downstream_failure`. Store trouble is reported as
HTTP 503. A lookup that fails leaves the code untouched and is retryable. A
consume the store never acknowledged comes back as `COMMIT_OUTCOME_UNKNOWN`
with `retryable: false`: the code may already be used.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local turnstile server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "codes", description = "Access code redemption"),
        (name = "stats", description = "Hourly entry/exit statistics (UTC buckets)"),
        (name = "occupancy", description = "Users currently inside the facility")
    ),
    paths(
        super::health::health_check,
        super::codes::redeem_code,
        super::stats::get_hour_stats,
        super::stats::get_day_stats,
        super::occupancy::get_occupancy,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Redemption types
            RedeemRequest,
            ValidationResponse,
            ResultReason,
            EventType,
            // Stats types
            HourlyStatsResponse,
            DayStatsResponse,
            // Occupancy types
            OccupancyResponse,
            OccupancyRecord,
            WorkoutTags,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "turnstile API");
        assert!(spec.paths.paths.contains_key("/api/codes/redeem"));
        assert!(spec.paths.paths.contains_key("/api/stats/hourly/{hour_key}"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"turnstile API\""));
        assert!(json.contains("ValidationResponse"));
    }
}
