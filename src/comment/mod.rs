//! Comment Module
//!
//! Reviews and general feedback. The comments table is the system of record;
//! every write is mirrored into the author's embedded list and, for book
//! reviews, into the book's embedded copy, all inside one transaction.

mod handler;
mod lib;
mod routes;

pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "comment_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
