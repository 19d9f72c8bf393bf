use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use arcana_core::config::SchedulerConfig;
use arcana_core::NotificationPayload;
use arcana_store::UserStore;

use crate::error::Result;
use crate::policy::should_notify;
use crate::router::DispatchRouter;

/// Counters for one cycle, logged at completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Users examined by the policy.
    pub evaluated: usize,
    /// Users the policy found due.
    pub due: usize,
    /// Due users whose dispatch completed (whatever the channel outcomes).
    pub dispatched: usize,
    /// Users skipped by per-user errors (policy or dispatch).
    pub errors: usize,
    /// True when the tick was ignored because a cycle was already running.
    pub skipped: bool,
}

/// Drives the recurring reminder cycle.
///
/// One ticker, one cycle at a time: a tick that arrives while a cycle is
/// still running is ignored, so a slow transport can never cause two
/// overlapping scans (and the duplicate sends re-entrancy would bring).
pub struct NotifyEngine {
    store: Arc<dyn UserStore>,
    router: Arc<DispatchRouter>,
    tick: Duration,
    concurrency: usize,
    running: AtomicBool,
}

impl NotifyEngine {
    pub fn new(
        store: Arc<dyn UserStore>,
        router: Arc<DispatchRouter>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            router,
            tick: Duration::from_secs(config.tick_secs),
            concurrency: config.dispatch_concurrency.max(1),
            running: AtomicBool::new(false),
        }
    }

    /// Main loop. Ticks at the configured interval until `shutdown`
    /// broadcasts `true`; the in-flight cycle finishes before the loop
    /// exits its awaited work.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs(), "notification engine started");

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle(Utc::now()).await {
                        Ok(stats) if stats.skipped => {}
                        Ok(stats) => info!(
                            evaluated = stats.evaluated,
                            due = stats.due,
                            dispatched = stats.dispatched,
                            errors = stats.errors,
                            "cycle complete"
                        ),
                        // Nothing was persisted; the next tick retries from scratch.
                        Err(e) => error!("cycle aborted: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("notification engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Execute one full cycle at the given instant.
    ///
    /// Public so tests (and operational tooling) can drive cycles with an
    /// explicit clock instead of waiting on the ticker.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("previous cycle still running — tick ignored");
            return Ok(CycleStats {
                skipped: true,
                ..CycleStats::default()
            });
        }
        let result = self.cycle(now).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        // Two bulk reads per cycle; a store failure here aborts the whole
        // cycle before any state is touched.
        let users = self.store.all_users().await?;
        let readings = self.store.daily_readings_on(now.date_naive()).await?;

        let mut due = Vec::new();
        let mut errors = 0usize;
        for user in &users {
            match should_notify(user, now, &readings) {
                Ok(true) => due.push(user),
                Ok(false) => {}
                // One malformed record must not cost everyone else their
                // reminder.
                Err(e) => {
                    errors += 1;
                    warn!(user_id = %user.id, error = %e, "policy evaluation failed — user skipped");
                }
            }
        }

        let payload = NotificationPayload::daily_reminder();
        let due_count = due.len();
        let dispatched = AtomicUsize::new(0);
        let dispatch_errors = AtomicUsize::new(0);

        futures_util::stream::iter(due)
            .for_each_concurrent(self.concurrency, |user| {
                let payload = &payload;
                let dispatched = &dispatched;
                let dispatch_errors = &dispatch_errors;
                async move {
                    match self.router.dispatch(user, payload, now).await {
                        Ok(_) => {
                            dispatched.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            dispatch_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(user_id = %user.id, error = %e, "dispatch failed — user skipped this cycle");
                        }
                    }
                }
            })
            .await;

        Ok(CycleStats {
            evaluated: users.len(),
            due: due_count,
            dispatched: dispatched.into_inner(),
            errors: errors + dispatch_errors.into_inner(),
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcana_channels::{ChannelError, EmailChannel};
    use arcana_store::{NotificationSettings, Reading, SqliteStore, StoreError, User};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    struct CountingEmail {
        sends: AtomicUsize,
    }

    impl CountingEmail {
        fn new() -> Self {
            Self {
                sends: AtomicUsize::new(0),
            }
        }
        fn count(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmailChannel for CountingEmail {
        async fn send(
            &self,
            _to: &str,
            _subject: &str,
            _html: &str,
            _text: &str,
        ) -> std::result::Result<String, ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok("<test@arcana.app>".to_string())
        }
    }

    enum PushMode {
        Ok,
        Gone,
    }

    struct FakePush {
        sends: AtomicUsize,
        mode: PushMode,
    }

    #[async_trait]
    impl arcana_channels::PushChannel for FakePush {
        async fn send(
            &self,
            _subscription: &arcana_core::PushSubscription,
            _payload: &serde_json::Value,
        ) -> std::result::Result<(), ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                PushMode::Ok => Ok(()),
                PushMode::Gone => Err(ChannelError::InvalidSubscription("410 Gone".to_string())),
            }
        }
    }

    /// Store whose bulk read always fails; used to exercise cycle aborts.
    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn all_users(&self) -> arcana_store::Result<Vec<User>> {
            Err(StoreError::Database(rusqlite::Error::InvalidQuery))
        }
        async fn user(&self, _id: &str) -> arcana_store::Result<Option<User>> {
            Ok(None)
        }
        async fn daily_readings_on(&self, _day: NaiveDate) -> arcana_store::Result<Vec<Reading>> {
            Ok(Vec::new())
        }
        async fn set_last_notified(
            &self,
            _user_id: &str,
            _at: DateTime<Utc>,
        ) -> arcana_store::Result<()> {
            Ok(())
        }
        async fn clear_push_subscription(&self, _user_id: &str) -> arcana_store::Result<()> {
            Ok(())
        }
    }

    fn user(id: &str, reminder_time: &str, push: bool) -> User {
        User {
            id: id.to_string(),
            display_name: format!("user-{id}"),
            email: Some(format!("{id}@example.com")),
            settings: Some(NotificationSettings {
                daily_reminder_enabled: true,
                reminder_time: reminder_time.to_string(),
                email_enabled: true,
                push_enabled: push,
            }),
            push_subscription: push.then(|| arcana_core::PushSubscription {
                endpoint: "https://push.example/ep".to_string(),
                keys: arcana_core::SubscriptionKeys {
                    p256dh: "p".to_string(),
                    auth: "a".to_string(),
                },
            }),
            last_notified: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn engine_with(
        store: Arc<SqliteStore>,
        email: Option<Arc<dyn EmailChannel>>,
        push: Option<Arc<dyn arcana_channels::PushChannel>>,
    ) -> NotifyEngine {
        let router = Arc::new(DispatchRouter::new(
            store.clone(),
            email,
            push,
            Duration::from_secs(10),
        ));
        NotifyEngine::new(store, router, &SchedulerConfig::default())
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn repeat_cycles_same_day_dispatch_once() {
        let store = Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        store.upsert_user(&user("u1", "09:00", false)).unwrap();
        let email = Arc::new(CountingEmail::new());
        let engine = engine_with(store, Some(email.clone()), None);

        let first = engine.run_cycle(at(9, 2)).await.unwrap();
        assert_eq!((first.due, first.dispatched), (1, 1));

        // A minute later the same day: last_notified now suppresses.
        let second = engine.run_cycle(at(9, 3)).await.unwrap();
        assert_eq!((second.due, second.dispatched), (0, 0));
        assert_eq!(email.count(), 1);
    }

    #[tokio::test]
    async fn malformed_user_does_not_block_others() {
        let store = Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        store.upsert_user(&user("broken", "9am", false)).unwrap();
        store.upsert_user(&user("fine", "09:00", false)).unwrap();
        let email = Arc::new(CountingEmail::new());
        let engine = engine_with(store.clone(), Some(email.clone()), None);

        let stats = engine.run_cycle(at(9, 0)).await.unwrap();

        assert_eq!(stats.evaluated, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(email.count(), 1);
        let fine = store.user("fine").await.unwrap().unwrap();
        assert!(fine.last_notified.is_some());
    }

    #[tokio::test]
    async fn dead_push_endpoint_self_heals_across_cycles() {
        let store = Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let mut u = user("u1", "09:00", true);
        u.email = None;
        store.upsert_user(&u).unwrap();
        let push = Arc::new(FakePush {
            sends: AtomicUsize::new(0),
            mode: PushMode::Gone,
        });
        let engine = engine_with(store.clone(), None, Some(push.clone()));

        engine.run_cycle(at(9, 0)).await.unwrap();
        assert_eq!(push.sends.load(Ordering::SeqCst), 1);
        assert!(store
            .user("u1")
            .await
            .unwrap()
            .unwrap()
            .push_subscription
            .is_none());

        // Next day, same slot: due again, but the dead endpoint is gone and
        // push is never attempted.
        let next_day = Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap();
        let stats = engine.run_cycle(next_day).await.unwrap();
        assert_eq!(stats.due, 1);
        assert_eq!(push.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_reading_today_suppresses_dispatch() {
        let store = Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        store.upsert_user(&user("u1", "09:00", false)).unwrap();
        store
            .record_reading(&Reading {
                id: "r1".to_string(),
                user_id: "u1".to_string(),
                kind: arcana_store::ReadingKind::Daily,
                created_at: at(7, 30),
            })
            .unwrap();
        let email = Arc::new(CountingEmail::new());
        let engine = engine_with(store, Some(email.clone()), None);

        let stats = engine.run_cycle(at(9, 2)).await.unwrap();
        assert_eq!(stats.due, 0);
        assert_eq!(email.count(), 0);
    }

    #[tokio::test]
    async fn bulk_fetch_failure_aborts_cycle() {
        let store: Arc<dyn UserStore> = Arc::new(BrokenStore);
        let router = Arc::new(DispatchRouter::new(
            store.clone(),
            None,
            None,
            Duration::from_secs(10),
        ));
        let engine = NotifyEngine::new(store, router, &SchedulerConfig::default());

        assert!(engine.run_cycle(at(9, 0)).await.is_err());
    }

    #[tokio::test]
    async fn tick_during_running_cycle_is_ignored() {
        let store = Arc::new(SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let engine = engine_with(store, None, None);

        engine.running.store(true, Ordering::SeqCst);
        let stats = engine.run_cycle(at(9, 0)).await.unwrap();
        assert!(stats.skipped);

        engine.running.store(false, Ordering::SeqCst);
        let stats = engine.run_cycle(at(9, 0)).await.unwrap();
        assert!(!stats.skipped);
    }
}
