use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::services::calendar::parse_timezone;
use doctor_cell::{resolve_slot, DoctorDirectory};
use shared_database::{BookingStore, BookingTx, RowLock};
use shared_models::scheduling::{Appointment, AppointmentStatus, CallStatus};

use crate::models::{
    parse_aware_datetime, Actor, AppointmentError, RequestAppointmentIn, RescheduleAppointmentIn,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::{NotificationOutbox, Notifier};
use crate::services::waiting_list::{promote_next, ReleasedSlot};

pub struct AppointmentBookingService {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn DoctorDirectory>,
    notifier: Arc<dyn Notifier>,
    lifecycle: AppointmentLifecycleService,
    conflicts: ConflictDetectionService,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn DoctorDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            lifecycle: AppointmentLifecycleService::new(),
            conflicts: ConflictDetectionService::new(),
        }
    }

    // ==============================================================================
    // REQUEST
    // ==============================================================================

    /// Create a REQUESTED appointment on one of the doctor's open slots.
    pub async fn request_appointment(
        &self,
        patient_id: Uuid,
        request: RequestAppointmentIn,
    ) -> Result<Appointment, AppointmentError> {
        let start_at = parse_aware_datetime(&request.start_at)?;
        parse_timezone(&request.timezone)?;

        debug!("Patient {} requesting doctor {} at {}", patient_id, request.doctor_id, start_at);

        self.directory.ensure_bookable(request.doctor_id).await?;

        let mut tx = self.store.begin().await?;

        let resolved = resolve_slot(tx.as_mut(), request.doctor_id, start_at, true)
            .await?
            .ok_or_else(|| AppointmentError::ValidationError("Requested slot is invalid".to_string()))?;

        if resolved.has_conflict {
            let conflicting = tx
                .find_confirmed_overlap(request.doctor_id, start_at, resolved.end_at, None, RowLock::None)
                .await?;
            warn!("Requested slot {} for doctor {} is already confirmed", start_at, request.doctor_id);
            return Err(AppointmentError::ConflictDetected {
                conflicting_appointment_id: conflicting.map(|a| a.id),
            });
        }

        let mut appointment = Appointment::requested(
            request.doctor_id,
            patient_id,
            start_at,
            resolved.end_at,
            request.timezone,
        );
        appointment.notes = request.notes;
        tx.insert_appointment(&appointment).await?;

        let mut outbox = NotificationOutbox::new();
        outbox.appointment_requested(&appointment);

        tx.commit().await?;
        outbox.dispatch(self.notifier.as_ref()).await;

        info!("Appointment {} requested with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    // ==============================================================================
    // CONFIRM
    // ==============================================================================

    /// Doctor accepts a request. Confirmations for one doctor are serialised
    /// by the doctor lock, so two overlapping requests can never both win.
    pub async fn confirm_appointment(
        &self,
        doctor_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let mut tx = self.store.begin().await?;
        tx.lock_doctor(doctor_id).await?;

        let mut appointment = tx
            .get_appointment(appointment_id, RowLock::ForUpdate)
            .await?
            .filter(|a| a.doctor_id == doctor_id)
            .ok_or(AppointmentError::NotFound)?;

        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Confirmed)?;

        if let Err(e) = self
            .conflicts
            .ensure_free(
                tx.as_mut(),
                doctor_id,
                appointment.start_at,
                appointment.end_at,
                Some(appointment.id),
                RowLock::ForUpdate,
            )
            .await
        {
            tx.rollback().await?;
            return Err(e);
        }

        appointment.status = AppointmentStatus::Confirmed;
        appointment.updated_at = Utc::now();
        tx.update_appointment(&appointment).await?;

        let mut outbox = NotificationOutbox::new();
        outbox.appointment_confirmed(&appointment);

        tx.commit().await?;
        outbox.dispatch(self.notifier.as_ref()).await;

        info!("Doctor {} confirmed appointment {}", doctor_id, appointment_id);
        Ok(appointment)
    }

    // ==============================================================================
    // CANCEL
    // ==============================================================================

    pub async fn cancel_appointment(
        &self,
        actor: Actor,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let mut tx = self.store.begin().await?;

        let mut appointment = self.load_for_participant(tx.as_mut(), actor, appointment_id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = Utc::now();
        tx.update_appointment(&appointment).await?;

        let mut outbox = NotificationOutbox::new();
        outbox.appointment_cancelled(&appointment);

        let released = ReleasedSlot::from(&appointment);
        if let Some(promoted) = promote_next(tx.as_mut(), &released, &mut outbox).await? {
            outbox.promotion_created(appointment.id, &promoted);
        }

        tx.commit().await?;
        outbox.dispatch(self.notifier.as_ref()).await;

        info!("Appointment {} cancelled by {}", appointment_id, actor.user_id);
        Ok(appointment)
    }

    // ==============================================================================
    // RESCHEDULE
    // ==============================================================================

    /// Move an appointment to another slot. The appointment goes back to
    /// REQUESTED and its old interval is offered to the waiting list.
    pub async fn reschedule_appointment(
        &self,
        actor: Actor,
        appointment_id: Uuid,
        request: RescheduleAppointmentIn,
    ) -> Result<Appointment, AppointmentError> {
        let start_at = parse_aware_datetime(&request.start_at)?;
        parse_timezone(&request.timezone)?;

        let mut tx = self.store.begin().await?;

        let mut appointment = self.load_for_participant(tx.as_mut(), actor, appointment_id).await?;
        self.lifecycle.validate_reschedule(appointment.status)?;

        let resolved = resolve_slot(tx.as_mut(), appointment.doctor_id, start_at, false)
            .await?
            .ok_or_else(|| AppointmentError::ValidationError("Requested slot is invalid".to_string()))?;

        self.conflicts
            .ensure_free(
                tx.as_mut(),
                appointment.doctor_id,
                start_at,
                resolved.end_at,
                Some(appointment.id),
                RowLock::None,
            )
            .await?;

        let released = ReleasedSlot::from(&appointment);

        appointment.start_at = start_at;
        appointment.end_at = resolved.end_at;
        appointment.timezone = request.timezone;
        appointment.status = AppointmentStatus::Requested;
        appointment.call_status = CallStatus::NotReady;
        appointment.fee_paid = false;
        appointment.updated_at = Utc::now();
        tx.update_appointment(&appointment).await?;

        let mut outbox = NotificationOutbox::new();
        promote_next(tx.as_mut(), &released, &mut outbox).await?;
        outbox.appointment_rescheduled(&appointment);

        tx.commit().await?;
        outbox.dispatch(self.notifier.as_ref()).await;

        info!(
            "Appointment {} moved from {} to {}",
            appointment_id, released.start_at, appointment.start_at
        );
        Ok(appointment)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(
        &self,
        actor: Actor,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let mut tx = self.store.begin().await?;
        let appointment = tx
            .get_appointment(appointment_id, RowLock::None)
            .await?
            .ok_or(AppointmentError::NotFound)?;
        tx.rollback().await?;

        if !actor.is_admin && !is_participant(&appointment, actor.user_id) {
            return Err(AppointmentError::Forbidden(
                "You are not part of this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    pub async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let mut tx = self.store.begin().await?;
        let appointments = tx.appointments_for_patient(patient_id).await?;
        tx.rollback().await?;
        Ok(appointments)
    }

    pub async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let mut tx = self.store.begin().await?;
        let appointments = tx.appointments_for_doctor(doctor_id).await?;
        tx.rollback().await?;
        Ok(appointments)
    }

    async fn load_for_participant(
        &self,
        tx: &mut dyn BookingTx,
        actor: Actor,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = tx
            .get_appointment(appointment_id, RowLock::ForUpdate)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !is_participant(&appointment, actor.user_id) {
            warn!("User {} attempted to modify appointment {}", actor.user_id, appointment_id);
            return Err(AppointmentError::Forbidden(
                "Only the patient or the doctor can change this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }
}

fn is_participant(appointment: &Appointment, user_id: Uuid) -> bool {
    appointment.patient_id == user_id || appointment.doctor_id == user_id
}
