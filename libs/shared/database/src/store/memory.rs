use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AppointmentStatus, AvailabilityException, AvailabilityRule, WaitingListEntry,
};

use super::{BookingStore, BookingTx, RowLock};
use crate::error::DatabaseError;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    rules: Vec<AvailabilityRule>,
    exceptions: Vec<AvailabilityException>,
    appointments: Vec<Appointment>,
    waiting_list: Vec<WaitingListEntry>,
}

/// Process-local store. A transaction owns the store mutex until it commits
/// or is dropped, so transactions are fully serialised and the per-doctor
/// lock is implied.
#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, DatabaseError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn is_confirmed_overlap(
    appointment: &Appointment,
    doctor_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    appointment.doctor_id == doctor_id
        && appointment.status == AppointmentStatus::Confirmed
        && appointment.overlaps(start, end)
}

fn sorted_by_start(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|a| (a.start_at, a.created_at));
    appointments
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn lock_doctor(&mut self, doctor_id: Uuid) -> Result<(), DatabaseError> {
        debug!("Doctor lock {} held through store mutex", doctor_id);
        Ok(())
    }

    async fn list_rules(&mut self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        let mut rules: Vec<AvailabilityRule> = self.working.rules.iter()
            .filter(|rule| rule.doctor_id == doctor_id)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| (rule.day_of_week, rule.start_time));
        Ok(rules)
    }

    async fn replace_rules(
        &mut self,
        doctor_id: Uuid,
        rules: Vec<AvailabilityRule>,
    ) -> Result<(), DatabaseError> {
        self.working.rules.retain(|rule| rule.doctor_id != doctor_id);
        self.working.rules.extend(rules);
        Ok(())
    }

    async fn list_exceptions(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilityException>, DatabaseError> {
        let mut exceptions: Vec<AvailabilityException> = self.working.exceptions.iter()
            .filter(|item| item.doctor_id == doctor_id)
            .cloned()
            .collect();
        exceptions.sort_by_key(|item| (item.date, item.sort_order));
        Ok(exceptions)
    }

    async fn replace_exceptions(
        &mut self,
        doctor_id: Uuid,
        exceptions: Vec<AvailabilityException>,
    ) -> Result<(), DatabaseError> {
        self.working.exceptions.retain(|item| item.doctor_id != doctor_id);
        self.working.exceptions.extend(exceptions);
        Ok(())
    }

    async fn get_appointment(
        &mut self,
        appointment_id: Uuid,
        _lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError> {
        Ok(self.working.appointments.iter()
            .find(|a| a.id == appointment_id)
            .cloned())
    }

    async fn find_confirmed_overlap(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        _lock: RowLock,
    ) -> Result<Option<Appointment>, DatabaseError> {
        let found = self.working.appointments.iter()
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| is_confirmed_overlap(a, doctor_id, start, end))
            .min_by_key(|a| a.start_at)
            .cloned();
        Ok(found)
    }

    async fn confirmed_in_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let found = self.working.appointments.iter()
            .filter(|a| is_confirmed_overlap(a, doctor_id, start, end))
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn appointments_for_doctor(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let found = self.working.appointments.iter()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn appointments_for_patient(
        &mut self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let found = self.working.appointments.iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError> {
        if self.working.appointments.iter().any(|a| a.id == appointment.id) {
            return Err(DatabaseError::Duplicate(format!("appointment {}", appointment.id)));
        }
        self.working.appointments.push(appointment.clone());
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), DatabaseError> {
        let existing = self.working.appointments.iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or(DatabaseError::NotFound)?;
        *existing = appointment.clone();
        Ok(())
    }

    async fn waiting_list(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Vec<WaitingListEntry>, DatabaseError> {
        let mut entries: Vec<WaitingListEntry> = self.working.waiting_list.iter()
            .filter(|e| e.appointment_id == appointment_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.position, e.created_at));
        Ok(entries)
    }

    async fn waiting_list_head(
        &mut self,
        appointment_id: Uuid,
        _lock: RowLock,
    ) -> Result<Option<WaitingListEntry>, DatabaseError> {
        Ok(self.waiting_list(appointment_id).await?.into_iter().next())
    }

    async fn insert_waiting_entry(&mut self, entry: &WaitingListEntry) -> Result<(), DatabaseError> {
        let clashes = self.working.waiting_list.iter().any(|e| {
            e.appointment_id == entry.appointment_id
                && (e.user_id == entry.user_id || e.position == entry.position)
        });
        if clashes {
            return Err(DatabaseError::Duplicate(format!(
                "waiting list entry for appointment {} user {}",
                entry.appointment_id, entry.user_id
            )));
        }
        self.working.waiting_list.push(entry.clone());
        Ok(())
    }

    async fn delete_waiting_entry(&mut self, entry_id: Uuid) -> Result<(), DatabaseError> {
        let before = self.working.waiting_list.len();
        self.working.waiting_list.retain(|e| e.id != entry_id);
        if self.working.waiting_list.len() == before {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn set_waiting_position(
        &mut self,
        entry_id: Uuid,
        position: i32,
    ) -> Result<(), DatabaseError> {
        let appointment_id = self.working.waiting_list.iter()
            .find(|e| e.id == entry_id)
            .map(|e| e.appointment_id)
            .ok_or(DatabaseError::NotFound)?;

        let taken = self.working.waiting_list.iter()
            .any(|e| e.appointment_id == appointment_id && e.id != entry_id && e.position == position);
        if taken {
            return Err(DatabaseError::Duplicate(format!(
                "waiting list position {} for appointment {}",
                position, appointment_id
            )));
        }

        if let Some(entry) = self.working.waiting_list.iter_mut().find(|e| e.id == entry_id) {
            entry.position = position;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn appointment(doctor_id: Uuid, hour: u32, status: AppointmentStatus) -> Appointment {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
        let mut appointment = Appointment::requested(
            doctor_id,
            Uuid::new_v4(),
            start,
            start + Duration::minutes(50),
            "UTC".to_string(),
        );
        appointment.status = status;
        appointment
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();
        let appt = appointment(doctor_id, 9, AppointmentStatus::Requested);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_appointment(&appt).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_appointment(appt.id, RowLock::None).await.unwrap().is_none());

        tx.insert_appointment(&appt).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_appointment(appt.id, RowLock::None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_confirmed_overlap_ignores_requested_and_excluded() {
        let store = MemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();
        let requested = appointment(doctor_id, 9, AppointmentStatus::Requested);
        let confirmed = appointment(doctor_id, 9, AppointmentStatus::Confirmed);

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(&requested).await.unwrap();
        tx.insert_appointment(&confirmed).await.unwrap();

        let found = tx
            .find_confirmed_overlap(doctor_id, requested.start_at, requested.end_at, None, RowLock::None)
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(confirmed.id));

        let excluded = tx
            .find_confirmed_overlap(
                doctor_id,
                requested.start_at,
                requested.end_at,
                Some(confirmed.id),
                RowLock::None,
            )
            .await
            .unwrap();
        assert!(excluded.is_none());

        // Touching intervals do not overlap.
        let after = tx
            .find_confirmed_overlap(doctor_id, confirmed.end_at, confirmed.end_at + Duration::hours(1), None, RowLock::None)
            .await
            .unwrap();
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn test_waiting_list_uniqueness() {
        let store = MemoryBookingStore::new();
        let appointment_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let entry = WaitingListEntry {
            id: Uuid::new_v4(),
            appointment_id,
            user_id,
            position: 1,
            created_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_waiting_entry(&entry).await.unwrap();

        let same_user = WaitingListEntry { id: Uuid::new_v4(), position: 2, ..entry.clone() };
        assert!(matches!(
            tx.insert_waiting_entry(&same_user).await,
            Err(DatabaseError::Duplicate(_))
        ));

        let same_position = WaitingListEntry { id: Uuid::new_v4(), user_id: Uuid::new_v4(), ..entry.clone() };
        assert!(matches!(
            tx.insert_waiting_entry(&same_position).await,
            Err(DatabaseError::Duplicate(_))
        ));
    }
}
