use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{AvailabilityException, AvailabilityRule, RecurrenceType};

use crate::services::calendar::parse_timezone;

pub const DEFAULT_TIMEZONE: &str = "Asia/Amman";

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_slot_duration() -> i32 {
    50
}

fn default_buffer() -> i32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_interval() -> i32 {
    1
}

// ==============================================================================
// RULE INPUT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRuleIn {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: i32,
    #[serde(default = "default_buffer")]
    pub buffer_minutes: i32,
    #[serde(default)]
    pub is_blocked: bool,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl AvailabilityRuleIn {
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if !(0..=6).contains(&self.day_of_week) {
            return Err(AvailabilityError::ValidationError(
                "day_of_week must be between 0 (Monday) and 6 (Sunday)".to_string(),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(AvailabilityError::ValidationError(
                "end_time must be after start_time".to_string(),
            ));
        }
        if !(10..=240).contains(&self.slot_duration_minutes) {
            return Err(AvailabilityError::ValidationError(
                "slot_duration_minutes must be between 10 and 240".to_string(),
            ));
        }
        if !(0..=120).contains(&self.buffer_minutes) {
            return Err(AvailabilityError::ValidationError(
                "buffer_minutes must be between 0 and 120".to_string(),
            ));
        }
        if let (Some(from), Some(to)) = (self.effective_from, self.effective_to) {
            if to < from {
                return Err(AvailabilityError::ValidationError(
                    "effective_to must be on or after effective_from".to_string(),
                ));
            }
        }
        parse_timezone(&self.timezone)?;
        Ok(())
    }

    pub fn into_rule(self, doctor_id: Uuid) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            timezone: self.timezone,
            slot_duration_minutes: self.slot_duration_minutes,
            buffer_minutes: self.buffer_minutes,
            is_blocked: self.is_blocked,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            created_at: Utc::now(),
        }
    }
}

// ==============================================================================
// EXCEPTION INPUT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityExceptionIn {
    pub date: NaiveDate,
    #[serde(default = "default_true")]
    pub is_unavailable: bool,
    #[serde(default = "default_true")]
    pub is_blocking: bool,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    #[serde(default = "default_interval")]
    pub recurrence_interval: i32,
    pub recurrence_until: Option<NaiveDate>,
    pub weekday: Option<i32>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub note: Option<String>,
}

impl AvailabilityExceptionIn {
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end <= start => {
                return Err(AvailabilityError::ValidationError(
                    "end_time must be after start_time".to_string(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(AvailabilityError::ValidationError(
                    "start_time and end_time must be provided together".to_string(),
                ));
            }
            _ => {}
        }

        if self.is_recurring != self.recurrence_type.is_some() {
            return Err(AvailabilityError::ValidationError(
                "recurrence_type is required for recurring exceptions and only for them".to_string(),
            ));
        }
        if self.recurrence_interval < 1 {
            return Err(AvailabilityError::ValidationError(
                "recurrence_interval must be at least 1".to_string(),
            ));
        }
        if let Some(until) = self.recurrence_until {
            if until < self.date {
                return Err(AvailabilityError::ValidationError(
                    "recurrence_until must be on or after date".to_string(),
                ));
            }
        }
        if let Some(weekday) = self.weekday {
            if !(0..=6).contains(&weekday) {
                return Err(AvailabilityError::ValidationError(
                    "weekday must be between 0 (Monday) and 6 (Sunday)".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `sort_order` is the position in the submitted set and fixes the
    /// application order of exceptions sharing a date.
    pub fn into_exception(self, doctor_id: Uuid, sort_order: i32) -> AvailabilityException {
        AvailabilityException {
            id: Uuid::new_v4(),
            doctor_id,
            date: self.date,
            is_unavailable: self.is_unavailable,
            is_blocking: self.is_blocking,
            is_recurring: self.is_recurring,
            recurrence_type: self.recurrence_type,
            recurrence_interval: self.recurrence_interval,
            recurrence_until: self.recurrence_until,
            weekday: self.weekday,
            start_time: self.start_time,
            end_time: self.end_time,
            note: self.note,
            sort_order,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkAvailabilityIn {
    #[serde(default)]
    pub rules: Vec<AvailabilityRuleIn>,
    #[serde(default)]
    pub exceptions: Vec<AvailabilityExceptionIn>,
}

// ==============================================================================
// QUERIES AND OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: String,
}

/// Outcome of checking one requested start instant against the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub end_at: DateTime<Utc>,
    pub timezone: String,
    pub has_conflict: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Directory lookup failed: {0}")]
    Directory(String),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
            AvailabilityError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AvailabilityError::Database(e) => AppError::Database(e.to_string()),
            AvailabilityError::Directory(msg) => AppError::ExternalService(msg),
        }
    }
}
