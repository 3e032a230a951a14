use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::{BookingStore, BookingTx, RowLock};
use shared_models::scheduling::{Appointment, WaitingListEntry};

use crate::models::{Actor, AppointmentError, WaitingListView};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::{NotificationOutbox, Notifier};

/// The interval an appointment gave up by being cancelled or moved.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedSlot {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: String,
    pub call_provider: Option<String>,
    pub call_room_id: Option<String>,
}

impl From<&Appointment> for ReleasedSlot {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            start_at: appointment.start_at,
            end_at: appointment.end_at,
            timezone: appointment.timezone.clone(),
            call_provider: appointment.call_provider.clone(),
            call_room_id: appointment.call_room_id.clone(),
        }
    }
}

/// Hand the released interval to the head of the appointment's queue.
///
/// The new appointment starts as REQUESTED so the doctor still has to
/// confirm it. Runs inside the caller's transaction.
pub async fn promote_next(
    tx: &mut dyn BookingTx,
    released: &ReleasedSlot,
    outbox: &mut NotificationOutbox,
) -> Result<Option<Appointment>, AppointmentError> {
    let Some(head) = tx
        .waiting_list_head(released.appointment_id, RowLock::ForUpdate)
        .await?
    else {
        debug!("No one is waiting on appointment {}", released.appointment_id);
        return Ok(None);
    };

    let mut promoted = Appointment::requested(
        released.doctor_id,
        head.user_id,
        released.start_at,
        released.end_at,
        released.timezone.clone(),
    );
    promoted.call_provider = released.call_provider.clone();
    promoted.call_room_id = released.call_room_id.clone();

    tx.insert_appointment(&promoted).await?;
    tx.delete_waiting_entry(head.id).await?;
    compact_positions(tx, released.appointment_id).await?;

    info!(
        "Promoted user {} from waiting list of {} into appointment {}",
        head.user_id, released.appointment_id, promoted.id
    );
    outbox.waiting_list_promoted(released.appointment_id, &promoted);

    Ok(Some(promoted))
}

/// Renumber the queue to 1..n, keeping its order.
pub async fn compact_positions(
    tx: &mut dyn BookingTx,
    appointment_id: Uuid,
) -> Result<(), AppointmentError> {
    let entries = tx.waiting_list(appointment_id).await?;

    // Ascending order only ever moves an entry into a slot already vacated.
    for (index, entry) in entries.iter().enumerate() {
        let position = index as i32 + 1;
        if entry.position != position {
            tx.set_waiting_position(entry.id, position).await?;
        }
    }
    Ok(())
}

// ==============================================================================
// WAITING LIST SERVICE
// ==============================================================================

pub struct WaitingListService {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    lifecycle: AppointmentLifecycleService,
}

impl WaitingListService {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Queue the caller behind an appointment. Joining twice returns the
    /// existing entry.
    pub async fn join(
        &self,
        actor: Actor,
        appointment_id: Uuid,
    ) -> Result<WaitingListEntry, AppointmentError> {
        debug!("User {} joining waiting list of {}", actor.user_id, appointment_id);

        let mut tx = self.store.begin().await?;

        // The row lock serialises joins so positions are handed out once.
        let appointment = tx
            .get_appointment(appointment_id, RowLock::ForUpdate)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if appointment.patient_id == actor.user_id {
            return Err(AppointmentError::BadRequest(
                "You are already assigned to this appointment".to_string(),
            ));
        }
        if !self.lifecycle.accepts_waiting_list(appointment.status) {
            return Err(AppointmentError::BadRequest(
                "Waiting list is closed for this appointment".to_string(),
            ));
        }

        let entries = tx.waiting_list(appointment_id).await?;
        if let Some(existing) = entries.iter().find(|e| e.user_id == actor.user_id) {
            debug!("User {} already queued at position {}", actor.user_id, existing.position);
            let existing = existing.clone();
            tx.rollback().await?;
            return Ok(existing);
        }

        let position = entries.iter().map(|e| e.position).max().unwrap_or(0) + 1;
        let entry = WaitingListEntry {
            id: Uuid::new_v4(),
            appointment_id,
            user_id: actor.user_id,
            position,
            created_at: Utc::now(),
        };
        tx.insert_waiting_entry(&entry).await?;

        let mut outbox = NotificationOutbox::new();
        outbox.waiting_list_joined(&appointment, actor.user_id, position);

        tx.commit().await?;
        outbox.dispatch(self.notifier.as_ref()).await;

        info!("User {} joined waiting list of {} at position {}", actor.user_id, appointment_id, position);
        Ok(entry)
    }

    /// Participants and admins see the whole queue; a queued user sees only
    /// their own entry.
    pub async fn view(
        &self,
        actor: Actor,
        appointment_id: Uuid,
    ) -> Result<WaitingListView, AppointmentError> {
        let mut tx = self.store.begin().await?;

        let appointment = tx
            .get_appointment(appointment_id, RowLock::None)
            .await?
            .ok_or(AppointmentError::NotFound)?;
        let entries = tx.waiting_list(appointment_id).await?;
        tx.rollback().await?;

        let is_participant = actor.user_id == appointment.patient_id
            || actor.user_id == appointment.doctor_id
            || actor.is_admin;
        let my_position = entries
            .iter()
            .find(|e| e.user_id == actor.user_id)
            .map(|e| e.position);

        if !is_participant && my_position.is_none() {
            return Err(AppointmentError::Forbidden(
                "You cannot view this waiting list".to_string(),
            ));
        }

        let total = entries.len();
        let entries = if is_participant {
            entries
        } else {
            entries.into_iter().filter(|e| e.user_id == actor.user_id).collect()
        };

        Ok(WaitingListView {
            appointment_id,
            total,
            my_position,
            entries,
        })
    }
}
