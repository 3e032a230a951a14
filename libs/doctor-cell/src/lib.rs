pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AvailabilityError, AvailableSlot, ResolvedSlot};
pub use router::{availability_routes, AvailabilityState};
pub use services::{
    resolve_slot, AvailabilityService, DoctorDirectory, OpenDoctorDirectory,
    SupabaseDoctorDirectory,
};
