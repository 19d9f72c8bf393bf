use arcana_core::PushSubscription;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user notification preferences. Stored as a JSON column on the user
/// row; a user with no settings at all gets no reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub daily_reminder_enabled: bool,
    /// Preferred reminder time as "HH:MM" (24h). Validated at match time,
    /// not at write time — the settings form is owned by the frontend.
    #[serde(default = "default_reminder_time")]
    pub reminder_time: String,
    #[serde(default = "bool_true")]
    pub email_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            daily_reminder_enabled: false,
            reminder_time: default_reminder_time(),
            email_enabled: true,
            push_enabled: false,
        }
    }
}

fn default_reminder_time() -> String {
    "09:00".to_string()
}

fn bool_true() -> bool {
    true
}

/// Full user record as the notification engine sees it. The application
/// owns account creation and settings edits; the engine only reads these
/// rows and advances `last_notified` / clears `push_subscription`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUID string — primary key.
    pub id: String,
    pub display_name: String,
    /// Destination for the email channel, if the account has one.
    pub email: Option<String>,
    /// Stored as JSON in SQLite (no separate settings table).
    pub settings: Option<NotificationSettings>,
    /// Stored as JSON in SQLite; cleared when the push service reports the
    /// endpoint permanently gone.
    pub push_subscription: Option<PushSubscription>,
    /// When the most recent reminder cycle processed this user. Never in
    /// the future; written only by the dispatch path.
    pub last_notified: Option<DateTime<Utc>>,

    // Audit timestamps (ISO-8601)
    pub created_at: String,
    pub updated_at: String,
}

/// What kind of reading a user completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    Daily,
    Decision,
    Spread,
    Purchase,
}

impl std::fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadingKind::Daily => "daily",
            ReadingKind::Decision => "decision",
            ReadingKind::Spread => "spread",
            ReadingKind::Purchase => "purchase",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReadingKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReadingKind::Daily),
            "decision" => Ok(ReadingKind::Decision),
            "spread" => Ok(ReadingKind::Spread),
            "purchase" => Ok(ReadingKind::Purchase),
            other => Err(format!("unknown reading kind: {other}")),
        }
    }
}

/// A completed reading. Read-only from the engine's point of view — used
/// solely to suppress the reminder for users who already drew today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub user_id: String,
    pub kind: ReadingKind,
    pub created_at: DateTime<Utc>,
}
