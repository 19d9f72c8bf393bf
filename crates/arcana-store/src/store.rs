use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::{
    db::{init_db, row_to_reading, row_to_user, USER_COLUMNS},
    error::{Result, StoreError},
    types::{Reading, User},
};

/// Store interface the engine is built against.
///
/// Implementations must be `Send + Sync`; the scheduler, the dispatch
/// router and every registry job task share one instance behind an `Arc`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The full user population — one bulk read per cycle.
    async fn all_users(&self) -> Result<Vec<User>>;

    /// A single current user record; registry jobs re-read state at fire
    /// time instead of trusting a snapshot taken at registration.
    async fn user(&self, id: &str) -> Result<Option<User>>;

    /// All `daily` readings created on the given UTC calendar day.
    async fn daily_readings_on(&self, day: NaiveDate) -> Result<Vec<Reading>>;

    /// Record that the reminder cycle processed this user.
    async fn set_last_notified(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Forget a push subscription the push service reported permanently gone.
    async fn clear_push_subscription(&self, user_id: &str) -> Result<()>;
}

/// SQLite-backed production store.
///
/// Uses a shared `Connection` behind a mutex so the engine and registry job
/// tasks can read and write without each opening their own handle. Queries
/// are short and synchronous; the lock is never held across an await.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a full user row. The application's account layer
    /// owns this path; the engine itself never creates users.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let settings = user
            .settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let subscription = user
            .push_subscription
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT OR REPLACE INTO users
             (id, display_name, email, settings, push_subscription,
              last_notified, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            rusqlite::params![
                user.id,
                user.display_name,
                user.email,
                settings,
                subscription,
                user.last_notified.map(|dt| dt.to_rfc3339()),
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Record a completed reading.
    pub fn record_reading(&self, reading: &Reading) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO readings (id, user_id, kind, created_at)
             VALUES (?1,?2,?3,?4)",
            rusqlite::params![
                reading.id,
                reading.user_id,
                reading.kind.to_string(),
                reading.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
        let mut rows = stmt.query_map([id], row_to_user)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn daily_readings_on(&self, day: NaiveDate) -> Result<Vec<Reading>> {
        // rfc3339 strings compare lexicographically within the same zone,
        // so the day filter is a plain TEXT range over the index.
        let start = format!("{day}T00:00:00");
        let end = match day.succ_opt() {
            Some(next) => format!("{next}T00:00:00"),
            None => format!("{}T00:00:00", NaiveDate::MAX),
        };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, kind, created_at FROM readings
             WHERE kind = 'daily' AND created_at >= ?1 AND created_at < ?2",
        )?;
        let readings = stmt
            .query_map([&start, &end], row_to_reading)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(readings)
    }

    async fn set_last_notified(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let at_str = at.to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE users SET last_notified = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![at_str, user_id],
        )?;
        if n == 0 {
            return Err(StoreError::UserNotFound {
                id: user_id.to_string(),
            });
        }
        debug!(user_id = %user_id, at = %at_str, "last_notified advanced");
        Ok(())
    }

    async fn clear_push_subscription(&self, user_id: &str) -> Result<()> {
        let now_str = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE users SET push_subscription = NULL, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_str, user_id],
        )?;
        if n == 0 {
            return Err(StoreError::UserNotFound {
                id: user_id.to_string(),
            });
        }
        debug!(user_id = %user_id, "push subscription cleared");
        Ok(())
    }
}
