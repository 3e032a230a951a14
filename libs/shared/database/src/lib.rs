pub mod error;
pub mod store;
pub mod supabase;

pub use error::DatabaseError;
pub use store::{BookingStore, BookingTx, RowLock};
pub use store::memory::MemoryBookingStore;
pub use store::postgres::PgBookingStore;
