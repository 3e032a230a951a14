use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::scheduling::Appointment;

use crate::models::{Notification, NotificationEvent};

/// Delivery of booking events to users. Failures never undo a committed
/// booking; callers only log them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

// ==============================================================================
// SUPABASE DELIVERY
// ==============================================================================

pub struct SupabaseNotifier {
    supabase: SupabaseClient,
}

impl SupabaseNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl Notifier for SupabaseNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        debug!(
            "Inserting {} notification for user {}",
            notification.event_type.as_str(),
            notification.user_id
        );

        let row = json!({
            "user_id": notification.user_id,
            "event_type": notification.event_type.as_str(),
            "title": notification.title,
            "body": notification.body,
            "channel": "IN_APP",
            "is_read": false,
            "metadata_json": notification.metadata,
        });

        self.supabase.insert("notifications", row).await?;
        Ok(())
    }
}

/// Used when no notification backend is configured.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            event_type = notification.event_type.as_str(),
            metadata = %notification.metadata,
            "{}",
            notification.title
        );
        Ok(())
    }
}

// ==============================================================================
// OUTBOX
// ==============================================================================

/// Notifications collected while a transaction is open and sent after it
/// commits. Dropping the outbox with the transaction sends nothing.
#[derive(Debug, Default)]
pub struct NotificationOutbox {
    pending: Vec<Notification>,
}

impl NotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        user_id: Uuid,
        event_type: NotificationEvent,
        title: &str,
        body: String,
        metadata: Value,
    ) {
        self.pending.push(Notification {
            user_id,
            event_type,
            title: title.to_string(),
            body,
            metadata,
        });
    }

    pub fn appointment_requested(&mut self, appointment: &Appointment) {
        self.push(
            appointment.doctor_id,
            NotificationEvent::AppointmentRequested,
            "New appointment request",
            format!("A patient requested an appointment at {}", appointment.start_at),
            json!({
                "appointment_id": appointment.id,
                "user_id": appointment.patient_id,
            }),
        );
    }

    pub fn appointment_confirmed(&mut self, appointment: &Appointment) {
        self.push(
            appointment.patient_id,
            NotificationEvent::AppointmentConfirmed,
            "Appointment confirmed",
            format!("Your appointment at {} was confirmed", appointment.start_at),
            json!({ "appointment_id": appointment.id }),
        );
    }

    pub fn appointment_cancelled(&mut self, appointment: &Appointment) {
        self.push(
            appointment.patient_id,
            NotificationEvent::AppointmentCancelled,
            "Appointment cancelled",
            format!("Your appointment at {} was cancelled", appointment.start_at),
            json!({ "appointment_id": appointment.id }),
        );
    }

    pub fn appointment_rescheduled(&mut self, appointment: &Appointment) {
        self.push(
            appointment.patient_id,
            NotificationEvent::AppointmentRescheduled,
            "Appointment rescheduled",
            format!("Your appointment moved to {}", appointment.start_at),
            json!({ "appointment_id": appointment.id }),
        );
    }

    pub fn waiting_list_joined(&mut self, appointment: &Appointment, user_id: Uuid, position: i32) {
        self.push(
            appointment.doctor_id,
            NotificationEvent::WaitingListJoined,
            "Waiting list updated",
            format!("A patient joined the waiting list at position {}", position),
            json!({
                "appointment_id": appointment.id,
                "user_id": user_id,
                "position": position,
            }),
        );
    }

    pub fn waiting_list_promoted(&mut self, source_appointment_id: Uuid, promoted: &Appointment) {
        self.push(
            promoted.patient_id,
            NotificationEvent::WaitingListPromoted,
            "A slot opened up",
            format!("You were moved from the waiting list to {}", promoted.start_at),
            json!({
                "source_appointment_id": source_appointment_id,
                "new_appointment_id": promoted.id,
            }),
        );
    }

    pub fn promotion_created(&mut self, source_appointment_id: Uuid, promoted: &Appointment) {
        self.push(
            promoted.doctor_id,
            NotificationEvent::WaitingListPromotionCreated,
            "Waiting list promotion",
            format!("A waiting patient now holds the request at {}", promoted.start_at),
            json!({
                "source_appointment_id": source_appointment_id,
                "new_appointment_id": promoted.id,
            }),
        );
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub async fn dispatch(self, notifier: &dyn Notifier) {
        for notification in &self.pending {
            if let Err(e) = notifier.notify(notification).await {
                warn!(
                    "Failed to deliver {} notification to {}: {}",
                    notification.event_type.as_str(),
                    notification.user_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Err(anyhow::anyhow!("smtp down"))
        }
    }

    fn appointment() -> Appointment {
        Appointment::requested(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 50, 0).unwrap(),
            "UTC".to_string(),
        )
    }

    #[test]
    fn test_recipients_follow_event() {
        let appt = appointment();
        let mut outbox = NotificationOutbox::new();

        outbox.appointment_requested(&appt);
        outbox.appointment_confirmed(&appt);
        outbox.waiting_list_joined(&appt, Uuid::new_v4(), 2);

        assert_eq!(outbox.pending[0].user_id, appt.doctor_id);
        assert_eq!(outbox.pending[0].metadata["user_id"], json!(appt.patient_id));
        assert_eq!(outbox.pending[1].user_id, appt.patient_id);
        assert_eq!(outbox.pending[2].metadata["position"], 2);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let mut outbox = NotificationOutbox::new();
        outbox.appointment_cancelled(&appointment());
        assert_eq!(outbox.len(), 1);

        outbox.dispatch(&FailingNotifier).await;
    }
}
