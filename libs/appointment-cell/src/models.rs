use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::AvailabilityError;
use shared_database::DatabaseError;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentStatus, WaitingListEntry};

// ==============================================================================
// CALLER
// ==============================================================================

/// The authenticated user acting on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Actor {
    pub fn from_user(user: &User) -> Result<Self, AppError> {
        Ok(Self {
            user_id: user.user_id()?,
            is_admin: user.is_admin(),
        })
    }
}

// ==============================================================================
// REQUEST BODIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAppointmentIn {
    pub doctor_id: Uuid,
    /// ISO-8601 with an explicit offset.
    pub start_at: String,
    pub timezone: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentIn {
    pub start_at: String,
    pub timezone: String,
}

/// Parse a client timestamp, refusing anything without an offset.
pub fn parse_aware_datetime(value: &str) -> Result<DateTime<Utc>, AppointmentError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            AppointmentError::ValidationError(
                "start_at must be an ISO-8601 timestamp with a timezone offset".to_string(),
            )
        })
}

// ==============================================================================
// RESPONSES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingListView {
    pub appointment_id: Uuid,
    pub total: usize,
    pub my_position: Option<i32>,
    pub entries: Vec<WaitingListEntry>,
}

// ==============================================================================
// NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    AppointmentRequested,
    AppointmentConfirmed,
    AppointmentCancelled,
    AppointmentRescheduled,
    WaitingListJoined,
    WaitingListPromoted,
    WaitingListPromotionCreated,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::AppointmentRequested => "APPOINTMENT_REQUESTED",
            NotificationEvent::AppointmentConfirmed => "APPOINTMENT_CONFIRMED",
            NotificationEvent::AppointmentCancelled => "APPOINTMENT_CANCELLED",
            NotificationEvent::AppointmentRescheduled => "APPOINTMENT_RESCHEDULED",
            NotificationEvent::WaitingListJoined => "WAITING_LIST_JOINED",
            NotificationEvent::WaitingListPromoted => "WAITING_LIST_PROMOTED",
            NotificationEvent::WaitingListPromotionCreated => "WAITING_LIST_PROMOTION_CREATED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub event_type: NotificationEvent,
    pub title: String,
    pub body: String,
    pub metadata: Value,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor is not bookable")]
    DoctorNotBookable,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Requested slot is already booked")]
    ConflictDetected {
        conflicting_appointment_id: Option<Uuid>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            AvailabilityError::DoctorNotFound => AppointmentError::DoctorNotBookable,
            AvailabilityError::Database(e) => AppointmentError::DatabaseError(e),
            AvailabilityError::Directory(msg) => AppointmentError::ExternalServiceError(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotBookable => {
                AppError::NotFound("Doctor is not bookable".to_string())
            }
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            e @ AppointmentError::InvalidStatusTransition { .. } => AppError::InvalidState(e.to_string()),
            AppointmentError::ConflictDetected { conflicting_appointment_id } => AppError::Conflict {
                message: "Requested slot is already booked".to_string(),
                conflicting_appointment_id,
            },
            AppointmentError::BadRequest(msg) => AppError::BadRequest(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(e) => AppError::Database(e.to_string()),
            AppointmentError::ExternalServiceError(msg) => AppError::ExternalService(msg),
        }
    }
}
