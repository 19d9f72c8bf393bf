use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result};

use crate::types::{Reading, User};

/// Initialise the store schema in `conn`.
///
/// Creates the `users` and `readings` tables (idempotent) plus the indices
/// the engine's bulk queries rely on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                 TEXT NOT NULL PRIMARY KEY,
            display_name       TEXT NOT NULL,
            email              TEXT,
            settings           TEXT,   -- JSON NotificationSettings or NULL
            push_subscription  TEXT,   -- JSON PushSubscription or NULL
            last_notified      TEXT,   -- ISO-8601 or NULL
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS readings (
            id          TEXT NOT NULL PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        ) STRICT;

        -- The cycle's bulk read: today's daily readings only.
        CREATE INDEX IF NOT EXISTS idx_readings_kind_created
            ON readings (kind, created_at);
        CREATE INDEX IF NOT EXISTS idx_readings_user
            ON readings (user_id, created_at);
        ",
    )?;
    Ok(())
}

/// Map a SELECT row (column order from USER_COLUMNS) to a User.
/// Centralised here so every query in this crate stays consistent.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let settings = row
        .get::<_, Option<String>>(3)?
        .and_then(|s| serde_json::from_str(&s).ok());
    let push_subscription = row
        .get::<_, Option<String>>(4)?
        .and_then(|s| serde_json::from_str(&s).ok());
    let last_notified = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| parse_rfc3339(&s));
    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        settings,
        push_subscription,
        last_notified,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) const USER_COLUMNS: &str =
    "id, display_name, email, settings, push_subscription, last_notified, created_at, updated_at";

/// Map a SELECT row (id, user_id, kind, created_at) to a Reading.
///
/// Rows with an unknown kind or unparseable timestamp map to `None` and are
/// skipped by callers — one bad row must not poison a bulk read.
pub(crate) fn row_to_reading(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<Reading>> {
    let kind_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let (Ok(kind), Some(created_at)) = (kind_str.parse(), parse_rfc3339(&created_str)) else {
        return Ok(None);
    };
    Ok(Some(Reading {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        created_at,
    }))
}

pub(crate) fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
