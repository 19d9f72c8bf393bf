//! `arcana-core` — shared types and configuration for the Arcana
//! notification engine.
//!
//! Everything here is plain data: the delivery payload, the push
//! subscription credential, the TOML/env configuration tree, and the
//! core error type. No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod payload;

pub use config::ArcanaConfig;
pub use error::{ArcanaError, Result};
pub use payload::{NotificationPayload, PushSubscription, SubscriptionKeys};
