use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Defines when a registry job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },

    /// Fire repeatedly with a fixed interval in seconds.
    Every { every_secs: u64 },

    /// Fire every day at the given hour and minute (UTC).
    Daily { hour: u8, minute: u8 },
}

impl Trigger {
    /// One-shot triggers remove their registry entry after firing.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Trigger::Once { .. })
    }
}

/// Compute the next UTC firing for `trigger` strictly after `from`.
///
/// Returns `None` when the trigger is exhausted (a `Once` whose instant has
/// already passed).
pub fn next_fire(trigger: &Trigger, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Trigger::Every { every_secs } => Some(from + Duration::seconds(*every_secs as i64)),

        Trigger::Daily { hour, minute } => {
            // Build today's candidate at HH:MM:00 UTC.
            let candidate = Utc
                .with_ymd_and_hms(
                    from.year(),
                    from.month(),
                    from.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;
            if candidate > from {
                Some(candidate)
            } else {
                // Today's slot has passed — advance to tomorrow.
                Some(candidate + Duration::days(1))
            }
        }
    }
}
