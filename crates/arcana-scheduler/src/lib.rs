//! `arcana-scheduler` — the reminder scheduling core.
//!
//! # Overview
//!
//! A single periodic ticker drives [`engine::NotifyEngine`]: each cycle
//! snapshots the clock, bulk-reads the user population and today's daily
//! readings, applies the pure [`policy::should_notify`] check per user, and
//! fans dispatch out through [`router::DispatchRouter`] with bounded
//! concurrency. The router owns the only two state mutations in the system:
//! advancing `last_notified` and forgetting dead push subscriptions.
//!
//! Ad-hoc one-shot or recurring notifications (milestones, win-backs) go
//! through [`registry::JobRegistry`], which runs each job on its own timer
//! task and shares the same dispatch path — bypassing the daily policy,
//! since those are semantically distinct events.
//!
//! # Trigger variants
//!
//! | Variant | Behaviour                              |
//! |---------|----------------------------------------|
//! | `Once`  | Single fire at an absolute UTC instant |
//! | `Every` | Repeat every N seconds                 |
//! | `Daily` | Fire at HH:MM UTC every day            |

pub mod engine;
pub mod error;
pub mod policy;
pub mod registry;
pub mod router;
pub mod trigger;

pub use engine::{CycleStats, NotifyEngine};
pub use error::{Result, SchedulerError};
pub use registry::{JobInfo, JobRegistry};
pub use router::{ChannelOutcome, DispatchResult, DispatchRouter};
pub use trigger::{next_fire, Trigger};
