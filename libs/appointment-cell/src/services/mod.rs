pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod notification;
pub mod waiting_list;

pub use booking::AppointmentBookingService;
pub use notification::{NotificationOutbox, Notifier, SupabaseNotifier, TracingNotifier};
pub use waiting_list::{ReleasedSlot, WaitingListService};
