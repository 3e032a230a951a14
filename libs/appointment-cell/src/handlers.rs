use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_doctor, require_patient};

use crate::models::{Actor, RequestAppointmentIn, RescheduleAppointmentIn};
use crate::router::AppointmentState;
use crate::services::{AppointmentBookingService, WaitingListService};

fn booking_service(state: &AppointmentState) -> AppointmentBookingService {
    AppointmentBookingService::new(
        state.store.clone(),
        state.directory.clone(),
        state.notifier.clone(),
    )
}

fn waiting_list_service(state: &AppointmentState) -> WaitingListService {
    WaitingListService::new(state.store.clone(), state.notifier.clone())
}

// ==============================================================================
// PATIENT ENDPOINTS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<RequestAppointmentIn>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    let patient_id = user.user_id()?;

    let appointment = booking_service(&state)
        .request_appointment(patient_id, request)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = user.user_id()?;
    let appointments = booking_service(&state).list_for_patient(patient_id).await?;
    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = booking_service(&state)
        .get_appointment(actor, appointment_id)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    debug!("Cancel requested for appointment {} by {}", appointment_id, actor.user_id);

    let appointment = booking_service(&state)
        .cancel_appointment(actor, appointment_id)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentIn>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = booking_service(&state)
        .reschedule_appointment(actor, appointment_id, request)
        .await?;
    Ok(Json(json!(appointment)))
}

// ==============================================================================
// WAITING LIST
// ==============================================================================

#[axum::debug_handler]
pub async fn join_waiting_list(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    let actor = Actor::from_user(&user)?;

    let entry = waiting_list_service(&state).join(actor, appointment_id).await?;
    Ok(Json(json!(entry)))
}

#[axum::debug_handler]
pub async fn get_waiting_list(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let view = waiting_list_service(&state).view(actor, appointment_id).await?;
    Ok(Json(json!(view)))
}

// ==============================================================================
// DOCTOR ENDPOINTS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctor_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let doctor_id = user.user_id()?;

    let appointments = booking_service(&state).list_for_doctor(doctor_id).await?;
    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let doctor_id = user.user_id()?;

    let appointment = booking_service(&state)
        .confirm_appointment(doctor_id, appointment_id)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn doctor_cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let actor = Actor::from_user(&user)?;

    let appointment = booking_service(&state)
        .cancel_appointment(actor, appointment_id)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn doctor_reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentIn>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let actor = Actor::from_user(&user)?;

    let appointment = booking_service(&state)
        .reschedule_appointment(actor, appointment_id, request)
        .await?;
    Ok(Json(json!(appointment)))
}
