//! Transactional access to the scheduling tables.
//!
//! Every booking operation opens one [`BookingTx`], performs all of its reads
//! and writes through it, and either commits or drops it. Dropping an
//! uncommitted transaction discards its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AvailabilityException, AvailabilityRule, WaitingListEntry,
};

use crate::error::DatabaseError;

/// Whether a read should hold a row lock until the transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    None,
    ForUpdate,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, DatabaseError>;
}

#[async_trait]
pub trait BookingTx: Send {
    /// Transaction-scoped mutual exclusion keyed by doctor id.
    async fn lock_doctor(&mut self, doctor_id: Uuid) -> Result<(), DatabaseError>;

    /// Rules ordered by `(day_of_week, start_time)`.
    async fn list_rules(&mut self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError>;

    async fn replace_rules(
        &mut self,
        doctor_id: Uuid,
        rules: Vec<AvailabilityRule>,
    ) -> Result<(), DatabaseError>;

    /// Exceptions ordered by `(date, sort_order)`.
    async fn list_exceptions(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilityException>, DatabaseError>;

    async fn replace_exceptions(
        &mut self,
        doctor_id: Uuid,
        exceptions: Vec<AvailabilityException>,
    ) -> Result<(), DatabaseError>;

    async fn get_appointment(
        &mut self,
        appointment_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError>;

    /// Any CONFIRMED appointment of the doctor overlapping `[start, end)`.
    async fn find_confirmed_overlap(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError>;

    /// All CONFIRMED appointments of the doctor overlapping `[start, end)`.
    async fn confirmed_in_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    async fn appointments_for_doctor(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    async fn appointments_for_patient(
        &mut self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError>;

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError>;

    /// Queue ordered by `(position, created_at)`.
    async fn waiting_list(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Vec<WaitingListEntry>, DatabaseError>;

    async fn waiting_list_head(
        &mut self,
        appointment_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<WaitingListEntry>, DatabaseError>;

    async fn insert_waiting_entry(&mut self, entry: &WaitingListEntry) -> Result<(), DatabaseError>;

    async fn delete_waiting_entry(&mut self, entry_id: Uuid) -> Result<(), DatabaseError>;

    async fn set_waiting_position(
        &mut self,
        entry_id: Uuid,
        position: i32,
    ) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
