//! `arcana-store` — user and reading records for the notification engine.
//!
//! The engine consumes the [`store::UserStore`] trait; [`store::SqliteStore`]
//! is the production implementation backed by a single SQLite file shared
//! with the rest of the application. The engine reads the population in
//! bulk and performs exactly two single-record mutations: advancing
//! `last_notified` and forgetting a dead push subscription.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::{SqliteStore, UserStore};
pub use types::{NotificationSettings, Reading, ReadingKind, User};
