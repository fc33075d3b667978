//! Hourly statistics API endpoints.
//!
//! Buckets are keyed by UTC hour (`YYYY-MM-DD-HH`). Buckets only exist for
//! hours with at least one event; the day view fills the gaps with zeros.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{HourKey, HourlyStatsBucket, TurnstileError};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the stats router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/hourly", get(get_day_stats))
        .route("/hourly/{hour_key}", get(get_hour_stats))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Entry/exit counts for one UTC hour.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "hour_key": "2025-01-15-09",
    "entries": 12,
    "exits": 7,
    "last_updated": "2025-01-15T09:58:41Z"
}))]
pub struct HourlyStatsResponse {
    /// Bucket key, `YYYY-MM-DD-HH` in UTC.
    #[schema(example = "2025-01-15-09")]
    pub hour_key: String,

    /// ENTER events in this hour.
    #[schema(example = 12, minimum = 0)]
    pub entries: u64,

    /// EXIT events in this hour.
    #[schema(example = 7, minimum = 0)]
    pub exits: u64,

    /// Time of the latest event in this hour; `null` if there were none.
    #[schema(nullable)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl HourlyStatsResponse {
    fn new(hour: HourKey, bucket: HourlyStatsBucket) -> Self {
        Self {
            hour_key: hour.to_string(),
            entries: bucket.entries,
            exits: bucket.exits,
            last_updated: bucket.last_updated,
        }
    }
}

/// Query parameters for the day view.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct DayStatsQuery {
    /// UTC calendar day in YYYY-MM-DD format.
    /// Defaults to the current UTC day if not specified.
    #[param(example = "2025-01-15")]
    pub date: Option<String>,
}

/// All 24 hours of one UTC day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DayStatsResponse {
    /// UTC day in YYYY-MM-DD format.
    #[schema(example = "2025-01-15")]
    pub date: String,

    /// Sum of entries over the day.
    #[schema(example = 84)]
    pub total_entries: u64,

    /// Sum of exits over the day.
    #[schema(example = 80)]
    pub total_exits: u64,

    /// One entry per hour, 00 through 23.
    pub hours: Vec<HourlyStatsResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the counters for a single hour.
#[utoipa::path(
    get,
    path = "/api/stats/hourly/{hour_key}",
    tag = "stats",
    operation_id = "getHourStats",
    summary = "Get one hourly bucket",
    params(
        ("hour_key" = String, Path, description = "UTC hour in YYYY-MM-DD-HH format", example = "2025-01-15-09")
    ),
    responses(
        (status = 200, description = "Bucket found", body = HourlyStatsResponse),
        (status = 400, description = "Malformed hour key", body = ErrorResponse),
        (status = 404, description = "No events recorded in that hour", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn get_hour_stats(
    State(state): State<SharedState>,
    Path(hour_key): Path<String>,
) -> ApiResult<Json<HourlyStatsResponse>> {
    let hour: HourKey = hour_key.parse()?;

    let bucket = state
        .orchestrator()
        .stats()
        .get_bucket(hour)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            error_code: "BUCKET_NOT_FOUND".to_string(),
            message: format!("No events recorded in hour {hour}"),
        })?;

    Ok(Json(HourlyStatsResponse::new(hour, bucket)))
}

/// Get all hourly buckets of one UTC day.
#[utoipa::path(
    get,
    path = "/api/stats/hourly",
    tag = "stats",
    operation_id = "getDayStats",
    summary = "Get the 24 hourly buckets of a day",
    description = "Hours without events are returned with zero counts.",
    params(DayStatsQuery),
    responses(
        (status = 200, description = "Day retrieved", body = DayStatsResponse),
        (status = 400, description = "Malformed date", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn get_day_stats(
    State(state): State<SharedState>,
    Query(query): Query<DayStatsQuery>,
) -> ApiResult<Json<DayStatsResponse>> {
    let date = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| TurnstileError::InvalidDate(raw))?,
        None => Utc::now().date_naive(),
    };

    let hours: Vec<HourlyStatsResponse> = state
        .orchestrator()
        .stats()
        .day(date)
        .await?
        .into_iter()
        .map(|(hour, bucket)| HourlyStatsResponse::new(hour, bucket))
        .collect();

    Ok(Json(DayStatsResponse {
        date: date.format("%Y-%m-%d").to_string(),
        total_entries: hours.iter().map(|h| h.entries).sum(),
        total_exits: hours.iter().map(|h| h.exits).sum(),
        hours,
    }))
}
