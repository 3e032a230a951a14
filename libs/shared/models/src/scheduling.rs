use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY RECORDS
// ==============================================================================

/// Recurring weekly window. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
    pub slot_duration_minutes: i32,
    pub buffer_minutes: i32,
    pub is_blocked: bool,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityRule {
    pub fn is_effective_on(&self, day: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| day >= from)
            && self.effective_to.map_or(true, |to| day <= to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    Weekly,
    Monthly,
}

impl RecurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::Weekly => "WEEKLY",
            RecurrenceType::Monthly => "MONTHLY",
        }
    }
}

impl fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEEKLY" => Ok(RecurrenceType::Weekly),
            "MONTHLY" => Ok(RecurrenceType::Monthly),
            other => Err(format!("unknown recurrence type: {}", other)),
        }
    }
}

/// Date-anchored override of the weekly rules. Exceptions are applied in
/// `(date, sort_order)` order; `sort_order` is the index in the submitted set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub is_unavailable: bool,
    pub is_blocking: bool,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_interval: i32,
    pub recurrence_until: Option<NaiveDate>,
    pub weekday: Option<i32>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub note: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityException {
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

// ==============================================================================
// APPOINTMENT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Requested => "REQUESTED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(AppointmentStatus::Requested),
            "CONFIRMED" => Ok(AppointmentStatus::Confirmed),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "NO_SHOW" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    NotReady,
    Ready,
    Live,
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::NotReady => "NOT_READY",
            CallStatus::Ready => "READY",
            CallStatus::Live => "LIVE",
            CallStatus::Ended => "ENDED",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_READY" => Ok(CallStatus::NotReady),
            "READY" => Ok(CallStatus::Ready),
            "LIVE" => Ok(CallStatus::Live),
            "ENDED" => Ok(CallStatus::Ended),
            other => Err(format!("unknown call status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: String,
    pub status: AppointmentStatus,
    pub call_provider: Option<String>,
    pub call_room_id: Option<String>,
    pub call_status: CallStatus,
    pub fee_paid: bool,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Fresh REQUESTED appointment with call and payment state reset.
    pub fn requested(
        doctor_id: Uuid,
        patient_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        timezone: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            start_at,
            end_at,
            timezone,
            status: AppointmentStatus::Requested,
            call_provider: None,
            call_room_id: None,
            call_status: CallStatus::NotReady,
            fee_paid: false,
            meeting_link: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_at, self.end_at, start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub user_id: Uuid,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}
