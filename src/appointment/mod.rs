//! Appointment Module
//!
//! Visit bookings. Rows live in the appointments table and are mirrored into
//! the owner's embedded list on every write.

mod handler;
mod lib;
mod routes;

pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "appointment_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
