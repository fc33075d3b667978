//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `codes` - Access code redemption
//! - `stats` - Hourly entry/exit statistics
//! - `occupancy` - Users currently inside
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::{Config, SwaggerUi};

use crate::state::SharedState;

pub mod codes;
pub mod error;
pub mod health;
pub mod occupancy;
pub mod openapi;
pub mod stats;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                      - Health check
/// /docs                        - Swagger UI
/// /api
/// ├── /codes/redeem            - Redeem an access code
/// ├── /stats/hourly            - 24 buckets of a UTC day
/// ├── /stats/hourly/{hour_key} - One hourly bucket
/// ├── /occupancy               - Users currently inside
/// └── /openapi.json            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            Router::new()
                .nest("/codes", codes::router())
                .nest("/stats", stats::router())
                .route("/occupancy", get(occupancy::get_occupancy))
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .merge(SwaggerUi::new("/docs").config(Config::from("/api/openapi.json")))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
