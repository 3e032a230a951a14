use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_doctor;

use crate::models::{
    AvailabilityExceptionIn, AvailabilityQuery, AvailabilityRuleIn, BulkAvailabilityIn,
};
use crate::router::AvailabilityState;
use crate::services::AvailabilityService;

fn service(state: &AvailabilityState) -> AvailabilityService {
    AvailabilityService::new(state.config.clone(), state.store.clone())
}

fn doctor_id(user: &User) -> Result<Uuid, AppError> {
    require_doctor(user)?;
    user.user_id()
}

// ==============================================================================
// DOCTOR SCHEDULE MANAGEMENT
// ==============================================================================

#[axum::debug_handler]
pub async fn list_rules(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let rules = service(&state).list_rules(doctor_id).await?;
    Ok(Json(json!(rules)))
}

#[axum::debug_handler]
pub async fn set_rules(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
    Json(rules): Json<Vec<AvailabilityRuleIn>>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let rules = service(&state).replace_rules(doctor_id, rules).await?;
    Ok(Json(json!(rules)))
}

#[axum::debug_handler]
pub async fn list_exceptions(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let exceptions = service(&state).list_exceptions(doctor_id).await?;
    Ok(Json(json!(exceptions)))
}

#[axum::debug_handler]
pub async fn set_exceptions(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
    Json(exceptions): Json<Vec<AvailabilityExceptionIn>>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let exceptions = service(&state).replace_exceptions(doctor_id, exceptions).await?;
    Ok(Json(json!(exceptions)))
}

#[axum::debug_handler]
pub async fn set_bulk_availability(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
    Json(bulk): Json<BulkAvailabilityIn>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let (rules, exceptions) = service(&state).replace_all(doctor_id, bulk).await?;

    Ok(Json(json!({
        "rules": rules,
        "exceptions": exceptions,
    })))
}

/// Slot preview for the calling doctor.
#[axum::debug_handler]
pub async fn get_my_calendar(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_id(&user)?;
    let slots = service(&state)
        .generate_slots(doctor_id, query.date_from, query.date_to)
        .await?;
    Ok(Json(json!(slots)))
}

// ==============================================================================
// PUBLIC AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let service = service(&state);
    service.validate_range(query.date_from, query.date_to)?;

    if !state.directory.is_public(doctor_id).await? {
        debug!("Availability requested for non-public doctor {}", doctor_id);
        return Err(AppError::NotFound("Doctor not found".to_string()));
    }

    let slots = service
        .generate_slots(doctor_id, query.date_from, query.date_to)
        .await?;
    Ok(Json(json!(slots)))
}
