use chrono::{DateTime, Timelike, Utc};

use arcana_store::{Reading, ReadingKind, User};

use crate::error::{Result, SchedulerError};

/// Width of the reminder match window in minutes.
///
/// The cycle ticks on a fixed interval, so an exact minute comparison would
/// miss most target times; the window guarantees a hit as long as a cycle
/// lands within it. Deduplication is `last_notified`'s job — a user whose
/// check lands on a window boundary may match in two adjacent cycles.
pub const MATCH_TOLERANCE_MINS: i64 = 5;

/// A parsed "HH:MM" reminder time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTime {
    pub hour: u32,
    pub minute: u32,
}

impl std::str::FromStr for ReminderTime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {s:?}"))?;
        let hour: u32 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("out of range time {s:?}"));
        }
        Ok(Self { hour, minute })
    }
}

impl ReminderTime {
    /// True when `now` falls inside the match window around this time.
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        now.hour() == self.hour
            && (now.minute() as i64 - self.minute as i64).abs() < MATCH_TOLERANCE_MINS
    }
}

/// Decide whether `user` is due a daily reminder at `now`.
///
/// Pure and side-effect-free; `todays_readings` is the bulk read of the
/// day's daily readings (any user — the function filters). Checks, in
/// order: reminders enabled, reminder time matches, not already notified
/// today, and no daily reading completed today (the user already engaged —
/// do not nag). A malformed `reminder_time` is an error so the caller can
/// isolate and log it per user rather than silently skipping.
pub fn should_notify(user: &User, now: DateTime<Utc>, todays_readings: &[Reading]) -> Result<bool> {
    let Some(settings) = user.settings.as_ref() else {
        return Ok(false);
    };
    if !settings.daily_reminder_enabled {
        return Ok(false);
    }

    let time: ReminderTime = settings
        .reminder_time
        .parse()
        .map_err(SchedulerError::InvalidReminderTime)?;
    if !time.matches(now) {
        return Ok(false);
    }

    if let Some(last) = user.last_notified {
        if last.date_naive() == now.date_naive() {
            return Ok(false);
        }
    }

    let engaged_today = todays_readings.iter().any(|r| {
        r.user_id == user.id
            && r.kind == ReadingKind::Daily
            && r.created_at.date_naive() == now.date_naive()
    });
    if engaged_today {
        return Ok(false);
    }

    Ok(true)
}
