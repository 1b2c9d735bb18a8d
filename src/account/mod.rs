//! Account Module
//!
//! User records with their denormalized embedded lists (cart, owned and
//! borrowed books, transaction history, comments, appointments). The account
//! row is the single writer of its own embedded lists; the ledger and catalog
//! tables stay the systems of record for transactions and books.

mod handler;
mod lib;
mod routes;

pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "account_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
