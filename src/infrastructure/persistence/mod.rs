//! SQLite-backed persistence for the seven stores named in §3/§6.1.

pub mod database;
pub mod repositories;

pub use database::{Database, Durability};
