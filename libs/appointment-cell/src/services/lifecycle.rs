use tracing::{debug, warn};

use shared_models::scheduling::AppointmentStatus;

use crate::models::AppointmentError;

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// COMPLETED and NO_SHOW are set outside this service; they are listed so
    /// the table is complete.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Requested => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Cancelled
            | AppointmentStatus::Completed
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    /// Rescheduling moves any live appointment back to REQUESTED.
    pub fn validate_reschedule(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        if current_status.is_terminal() {
            warn!("Reschedule attempted on terminal appointment ({})", current_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: AppointmentStatus::Requested,
            });
        }
        Ok(())
    }

    /// Only live appointments accept a waiting list.
    pub fn accepts_waiting_list(&self, current_status: AppointmentStatus) -> bool {
        matches!(current_status, AppointmentStatus::Requested | AppointmentStatus::Confirmed)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_transition_table() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Requested, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Confirmed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Requested, AppointmentStatus::Completed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let lifecycle = AppointmentLifecycleService::new();

        for terminal in [
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ] {
            assert!(lifecycle.get_valid_transitions(terminal).is_empty());
            assert!(lifecycle.validate_reschedule(terminal).is_err());
            assert!(!lifecycle.accepts_waiting_list(terminal));
        }

        assert!(lifecycle.validate_reschedule(AppointmentStatus::Confirmed).is_ok());
    }
}
