pub mod availability;
pub mod calendar;
pub mod directory;
pub mod generator;
pub mod resolver;

pub use availability::AvailabilityService;
pub use directory::{DoctorDirectory, OpenDoctorDirectory, SupabaseDoctorDirectory};
pub use resolver::resolve_slot;
