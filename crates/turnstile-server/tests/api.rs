//! End-to-end tests for the HTTP API over an in-memory store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use turnstile_core::store::{Commit, Versioned, Write};
use turnstile_core::{
    AccessCodeDoc, Collection, DocumentStore, EventType, HourKey, RetryPolicy, StoreError,
    StoreHandle, StoreResult, TurnstileConfig, ValidationResponse,
};
use turnstile_server::api::create_router;
use turnstile_server::state::AppState;

fn server_with(store: StoreHandle) -> TestServer {
    let state = AppState::with_store(TurnstileConfig::default(), store);
    TestServer::new(create_router(state)).unwrap()
}

async fn issue(store: &StoreHandle, code: &str, user: &str, event_type: EventType, ttl: Duration) {
    store
        .set(Collection::AccessCodes, code, &AccessCodeDoc::new(user, event_type, Utc::now() + ttl))
        .await
        .unwrap();
}

/// A store that is always down.
struct Offline;

#[async_trait]
impl DocumentStore for Offline {
    fn backend(&self) -> &'static str {
        "offline"
    }

    async fn get(&self, _: Collection, _: &str) -> StoreResult<Option<Versioned>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn commit(&self, _: Collection, _: &str, _: Option<u64>, _: Write) -> StoreResult<Commit> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _: Collection, _: &str, _: Value) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _: Collection, _: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list(&self, _: Collection) -> StoreResult<Vec<(String, Versioned)>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_health_reports_backend() {
    let server = server_with(StoreHandle::in_memory());

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store_backend"], "memory");
    assert_eq!(body["timezone"], "UTC");
}

#[tokio::test]
async fn test_health_reports_configured_timezone() {
    let mut config = TurnstileConfig::default();
    config.system.timezone = "Europe/Berlin".to_string();
    let server = TestServer::new(create_router(AppState::with_store(config, StoreHandle::in_memory()))).unwrap();

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["timezone"], "Europe/Berlin");
}

#[tokio::test]
async fn test_redeem_valid_code_then_replay() {
    let store = StoreHandle::in_memory();
    issue(&store, "ABC123", "u1", EventType::Enter, Duration::minutes(5)).await;
    let server = server_with(store);

    let first = server
        .post("/api/codes/redeem")
        .json(&json!({ "code": "ABC123" }))
        .await;
    first.assert_status_ok();
    let result: ValidationResponse = first.json();
    assert!(result.is_valid);
    assert_eq!(result.user_id.as_deref(), Some("u1"));
    assert_eq!(result.event_type, Some(EventType::Enter));

    let replay: ValidationResponse = server
        .post("/api/codes/redeem")
        .json(&json!({ "code": "ABC123" }))
        .await
        .json();
    assert!(!replay.is_valid);
    assert_eq!(replay.reason_str(), "not_found");
}

#[tokio::test]
async fn test_redeem_expired_code() {
    let store = StoreHandle::in_memory();
    issue(&store, "OLD999", "u1", EventType::Enter, -Duration::hours(1)).await;
    let server = server_with(store);

    let body: Value = server
        .post("/api/codes/redeem")
        .json(&json!({ "code": "OLD999" }))
        .await
        .json();
    assert_eq!(body["is_valid"], false);
    assert!(body["user_id"].is_null());
    assert_eq!(body["reason"], "expired");
}

#[tokio::test]
async fn test_redeem_with_store_down_is_503() {
    let store = StoreHandle::new(Arc::new(Offline), StdDuration::from_secs(1), RetryPolicy::no_retry());
    let server = server_with(store);

    let response = server
        .post("/api/codes/redeem")
        .json(&json!({ "code": "ABC123" }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn test_enter_shows_in_stats_and_occupancy() {
    let store = StoreHandle::in_memory();
    issue(&store, "IN1", "u1", EventType::Enter, Duration::minutes(5)).await;
    issue(&store, "IN2", "u2", EventType::Enter, Duration::minutes(5)).await;
    let server = server_with(store);

    let before = Utc::now();
    for code in ["IN1", "IN2"] {
        server
            .post("/api/codes/redeem")
            .json(&json!({ "code": code }))
            .await
            .assert_status_ok();
    }
    let after = Utc::now();

    let occupancy: Value = server.get("/api/occupancy").await.json();
    assert_eq!(occupancy["count"], 2);
    assert_eq!(occupancy["users"][0]["userId"], "u1");

    // The clock may tick into a new hour between the two redemptions.
    let mut keys = vec![HourKey::containing(before), HourKey::containing(after)];
    keys.dedup();
    let mut entries = 0;
    for key in keys {
        let response = server.get(&format!("/api/stats/hourly/{key}")).await;
        if response.status_code() == StatusCode::OK {
            let bucket: Value = response.json();
            entries += bucket["entries"].as_u64().unwrap();
        }
    }
    assert_eq!(entries, 2);
}

#[tokio::test]
async fn test_hour_bucket_not_found_and_bad_key() {
    let server = server_with(StoreHandle::in_memory());

    let missing = server.get("/api/stats/hourly/2020-01-01-00").await;
    missing.assert_status(StatusCode::NOT_FOUND);

    let bad = server.get("/api/stats/hourly/yesterday").await;
    bad.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = bad.json();
    assert_eq!(body["error"], "INVALID_HOUR_KEY");
}

#[tokio::test]
async fn test_day_view_fills_empty_hours() {
    let store = StoreHandle::in_memory();
    store
        .set(
            Collection::HourlyStats,
            "2025-01-15-09",
            &json!({ "entries": 3, "exits": 1, "last_updated": "2025-01-15T09:40:00Z" }),
        )
        .await
        .unwrap();
    let server = server_with(store);

    let body: Value = server
        .get("/api/stats/hourly")
        .add_query_param("date", "2025-01-15")
        .await
        .json();
    assert_eq!(body["date"], "2025-01-15");
    assert_eq!(body["total_entries"], 3);
    assert_eq!(body["hours"][9]["entries"], 3);
    assert_eq!(body["hours"][10]["entries"], 0);
    assert!(body["hours"][10]["last_updated"].is_null());

    let bad = server
        .get("/api/stats/hourly")
        .add_query_param("date", "15/01/2025")
        .await;
    bad.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let server = server_with(StoreHandle::in_memory());

    let spec: Value = server.get("/api/openapi.json").await.json();
    assert_eq!(spec["info"]["title"], "turnstile API");
    assert!(spec["paths"]["/api/codes/redeem"].is_object());
}
