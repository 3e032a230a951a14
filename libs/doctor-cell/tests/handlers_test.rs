use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Query, State},
    http::{header, Request, StatusCode},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use doctor_cell::handlers::*;
use doctor_cell::models::*;
use doctor_cell::{availability_routes, AvailabilityState, DoctorDirectory, OpenDoctorDirectory};
use shared_database::MemoryBookingStore;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct HiddenDirectory;

#[async_trait]
impl DoctorDirectory for HiddenDirectory {
    async fn is_public(&self, _doctor_id: Uuid) -> Result<bool, AvailabilityError> {
        Ok(false)
    }

    async fn ensure_bookable(&self, _doctor_id: Uuid) -> Result<(), AvailabilityError> {
        Err(AvailabilityError::DoctorNotFound)
    }
}

fn state_with(directory: Arc<dyn DoctorDirectory>) -> Arc<AvailabilityState> {
    Arc::new(AvailabilityState {
        config: TestConfig::default().to_arc(),
        store: Arc::new(MemoryBookingStore::new()),
        directory,
    })
}

fn open_state() -> Arc<AvailabilityState> {
    state_with(Arc::new(OpenDoctorDirectory))
}

fn monday_rule() -> AvailabilityRuleIn {
    serde_json::from_value(json!({
        "day_of_week": 0,
        "start_time": "09:00:00",
        "end_time": "12:00:00",
        "timezone": "Asia/Amman",
        "slot_duration_minutes": 50,
        "buffer_minutes": 10
    }))
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_doctor_sets_rules_and_public_sees_slots() {
    let state = open_state();
    let doctor = TestUser::doctor("doc@example.com");

    let Json(stored) = set_rules(
        State(state.clone()),
        Extension(doctor.to_user()),
        Json(vec![monday_rule()]),
    )
    .await
    .unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 1);
    assert_eq!(stored[0]["timezone"], "Asia/Amman");

    let response = availability_routes(state)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/doctors/{}/availability?date_from=2026-03-02&date_to=2026-03-08",
                    doctor.id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let slots = body_json(response).await;
    let starts: Vec<&str> = slots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start_at"].as_str().unwrap())
        .collect();
    // Amman is UTC+3.
    assert_eq!(
        starts,
        vec!["2026-03-02T06:00:00Z", "2026-03-02T07:00:00Z", "2026-03-02T08:00:00Z"]
    );
}

#[tokio::test]
async fn test_range_over_limit_is_rejected() {
    let state = open_state();
    let doctor_id = Uuid::new_v4();

    let response = availability_routes(state)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/doctors/{}/availability?date_from=2026-03-01&date_to=2026-05-01",
                    doctor_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reversed_range_is_rejected() {
    let state = open_state();
    let doctor = TestUser::doctor("doc@example.com");

    let result = get_my_calendar(
        State(state),
        Extension(doctor.to_user()),
        Query(AvailabilityQuery {
            date_from: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_hidden_doctor_is_not_found() {
    let state = state_with(Arc::new(HiddenDirectory));

    let response = availability_routes(state)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/doctors/{}/availability?date_from=2026-03-02&date_to=2026-03-02",
                    Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patient_cannot_edit_rules() {
    let state = open_state();
    let patient = TestUser::patient("p@example.com");

    let result = set_rules(
        State(state),
        Extension(patient.to_user()),
        Json(vec![monday_rule()]),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_invalid_rule_is_rejected_and_nothing_stored() {
    let state = open_state();
    let doctor = TestUser::doctor("doc@example.com");

    set_rules(State(state.clone()), Extension(doctor.to_user()), Json(vec![monday_rule()]))
        .await
        .unwrap();

    let mut broken = monday_rule();
    broken.end_time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    let result = set_rules(
        State(state.clone()),
        Extension(doctor.to_user()),
        Json(vec![monday_rule(), broken]),
    )
    .await;
    assert_matches!(result, Err(AppError::ValidationError(_)));

    let Json(rules) = list_rules(State(state), Extension(doctor.to_user())).await.unwrap();
    assert_eq!(rules.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let state = open_state();

    let response = availability_routes(state)
        .oneshot(
            Request::builder()
                .uri("/doctor/availability/rules")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bulk_replace_through_router() {
    let state = open_state();
    let config = TestConfig::default();
    let doctor = TestUser::doctor("doc@example.com");

    let body = json!({
        "rules": [{
            "day_of_week": 0,
            "start_time": "09:00:00",
            "end_time": "12:00:00",
            "timezone": "UTC"
        }],
        "exceptions": [
            {"date": "2026-03-02"},
            {"date": "2026-03-02", "is_blocking": false, "start_time": "10:00:00", "end_time": "11:00:00"}
        ]
    });

    let response = availability_routes(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/doctor/availability/bulk")
                .header(header::AUTHORIZATION, JwtTestUtils::bearer(&doctor, &config))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = body_json(response).await;
    assert_eq!(stored["rules"].as_array().unwrap().len(), 1);
    assert_eq!(stored["exceptions"][1]["sort_order"], 1);

    let Json(slots) = get_my_calendar(
        State(state),
        Extension(doctor.to_user()),
        Query(AvailabilityQuery {
            date_from: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(slots.as_array().unwrap().len(), 1);
    assert_eq!(slots[0]["start_at"], "2026-03-02T10:00:00Z");
}
