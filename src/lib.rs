pub mod account;
pub mod api;
pub mod appointment;
pub mod auth;
pub mod catalog;
pub mod comment;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod helpers;
pub mod ledger;
pub mod model;
