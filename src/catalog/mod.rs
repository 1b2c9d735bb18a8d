//! Catalog Module
//!
//! The store of book records and their copy-availability counters. Stock is
//! only ever taken through the conditional decrement in [`Catalog::reserve_copy`]
//! and given back through the clamped increment in [`Catalog::release_copy`],
//! which keeps `available_copies` inside `0..=total_copies` even under
//! concurrent checkouts.

mod handler;
mod lib;
mod routes;

pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "catalog_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
