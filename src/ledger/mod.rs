//! Ledger Module
//!
//! Transaction records and the two workflows that keep the ledger, the
//! catalog stock counters, and the account's embedded histories consistent:
//! checkout (cart -> committed transaction) and book return. Both run under
//! the database write lock inside a single transaction, so a failure at any
//! step rolls the whole invocation back instead of leaving a partially
//! applied state across the three tables.

mod handler;
mod lib;
mod routes;

pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "ledger_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
