use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{BookingTx, RowLock};

use crate::models::AppointmentError;

/// Enforces "at most one CONFIRMED appointment per doctor per interval".
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Fails with the id of the confirmed appointment occupying `[start, end)`.
    pub async fn ensure_free(
        &self,
        tx: &mut dyn BookingTx,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        lock: RowLock,
    ) -> Result<(), AppointmentError> {
        debug!("Checking confirmed overlap for doctor {} from {} to {}", doctor_id, start, end);

        let conflict = tx
            .find_confirmed_overlap(doctor_id, start, end, exclude_appointment_id, lock)
            .await?;

        match conflict {
            Some(existing) => {
                warn!(
                    "Interval {} - {} for doctor {} is held by confirmed appointment {}",
                    start, end, doctor_id, existing.id
                );
                Err(AppointmentError::ConflictDetected {
                    conflicting_appointment_id: Some(existing.id),
                })
            }
            None => Ok(()),
        }
    }
}

impl Default for ConflictDetectionService {
    fn default() -> Self {
        Self::new()
    }
}
