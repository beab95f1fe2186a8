//! Persistence for the paid-inbox messaging backend.
//!
//! `Store` is the single interface every other crate calls into; it hides
//! which of the three persistence modes is actually running
//! behind it. Strict and Embedded share one SQL dialect via `sqlx::Any`
//! (Postgres and SQLite both understand the same query text and `?`
//! placeholders through that driver), so a method is written once and runs
//! against either database. File mode bypasses SQL entirely.

pub mod config;
pub mod error;
pub mod file_backend;
pub mod models;

mod store;

pub use config::{PersistenceMode, StoreConfig};
pub use error::{DbError, DbResult};
pub use models::*;
pub use store::{Backend, ContactHistoryRow, DeliveryJobStats, HealthStatus, InboxEntry, SendOutcome, Store};
