//! `arcana-channels` — delivery channel adapters for the notification engine.
//!
//! # Adapters
//!
//! | Adapter      | Transport                                   |
//! |--------------|---------------------------------------------|
//! | `SmtpMailer` | SMTP relay via lettre (STARTTLS, multipart) |
//! | `HttpPusher` | Web push endpoint POST via reqwest          |
//!
//! The dispatch router only sees the [`channel::EmailChannel`] and
//! [`channel::PushChannel`] traits; swapping a transport (or injecting a
//! fake in tests) never touches routing code. The one transport detail the
//! router depends on is the [`error::ChannelError::InvalidSubscription`]
//! classification — the signal that a push endpoint is permanently gone and
//! must be forgotten.

pub mod channel;
pub mod email;
pub mod error;
pub mod push;

pub use channel::{EmailChannel, PushChannel};
pub use email::SmtpMailer;
pub use error::ChannelError;
pub use push::HttpPusher;
