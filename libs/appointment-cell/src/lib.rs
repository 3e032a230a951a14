pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Actor, AppointmentError, Notification, NotificationEvent, WaitingListView};
pub use router::{appointment_routes, AppointmentState};
pub use services::{
    AppointmentBookingService, Notifier, SupabaseNotifier, TracingNotifier, WaitingListService,
};
