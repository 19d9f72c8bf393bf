use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{info, warn};

use arcana_channels::{ChannelError, EmailChannel, PushChannel};
use arcana_core::NotificationPayload;
use arcana_store::{User, UserStore};

use crate::error::Result;

/// What happened on one channel for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// The transport accepted the message.
    Delivered,
    /// Transient failure — the next day's cycle retries naturally.
    Failed,
    /// The destination is permanently dead and has been forgotten.
    Invalid,
    /// The channel was disabled, unconfigured, or had no destination.
    Skipped,
}

impl ChannelOutcome {
    pub fn attempted(self) -> bool {
        !matches!(self, ChannelOutcome::Skipped)
    }
}

/// Aggregated per-user dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    pub email: ChannelOutcome,
    pub push: ChannelOutcome,
}

impl DispatchResult {
    /// True when at least one channel send was actually made.
    pub fn attempted(&self) -> bool {
        self.email.attempted() || self.push.attempted()
    }

    pub fn delivered(&self) -> bool {
        self.email == ChannelOutcome::Delivered || self.push == ChannelOutcome::Delivered
    }
}

/// Fans one notification out across the user's enabled channels.
///
/// Channels are independent side effects: an email failure never blocks the
/// push leg and vice versa. The router owns the system's two state
/// mutations — it advances `last_notified` once a due user has been
/// processed (whatever the per-channel outcomes — a user whose provider is
/// bouncing mail must not be retried every cycle all day), and it clears a
/// push subscription the push service reports permanently gone.
pub struct DispatchRouter {
    store: Arc<dyn UserStore>,
    email: Option<Arc<dyn EmailChannel>>,
    push: Option<Arc<dyn PushChannel>>,
    /// Per channel call; a hung transport must not stall the cycle.
    dispatch_timeout: Duration,
}

impl DispatchRouter {
    pub fn new(
        store: Arc<dyn UserStore>,
        email: Option<Arc<dyn EmailChannel>>,
        push: Option<Arc<dyn PushChannel>>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            email,
            push,
            dispatch_timeout,
        }
    }

    /// Deliver `payload` to `user` and persist the resulting state.
    ///
    /// Callers have already decided the user should be notified (the cycle
    /// via policy, the registry by fiat); the router does not re-check.
    pub async fn dispatch(
        &self,
        user: &User,
        payload: &NotificationPayload,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult> {
        let email = self.send_email(user, payload).await;
        let push = self.send_push(user, payload).await;
        let result = DispatchResult { email, push };

        // Mark the user processed for today even when nothing was
        // deliverable, so the remaining cycles of the day don't re-evaluate
        // them. A user who enables a channel later today waits until
        // tomorrow; product has signed off on that trade.
        self.store.set_last_notified(&user.id, now).await?;

        info!(
            user_id = %user.id,
            email = ?result.email,
            push = ?result.push,
            "notification dispatched"
        );
        Ok(result)
    }

    async fn send_email(&self, user: &User, payload: &NotificationPayload) -> ChannelOutcome {
        // Email defaults to enabled for accounts that predate the settings
        // form; an account with no address still has nothing to send to.
        let enabled = user.settings.as_ref().map_or(true, |s| s.email_enabled);
        if !enabled {
            return ChannelOutcome::Skipped;
        }
        let Some(channel) = &self.email else {
            return ChannelOutcome::Skipped;
        };
        let Some(to) = &user.email else {
            return ChannelOutcome::Skipped;
        };

        let send = channel.send(to, &payload.title, &payload.body, &payload.body);
        match timeout(self.dispatch_timeout, send).await {
            Ok(Ok(message_id)) => {
                info!(user_id = %user.id, message_id = %message_id, "reminder email delivered");
                ChannelOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!(user_id = %user.id, error = %e, "email send failed");
                ChannelOutcome::Failed
            }
            Err(_) => {
                warn!(
                    user_id = %user.id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "email send timed out"
                );
                ChannelOutcome::Failed
            }
        }
    }

    async fn send_push(&self, user: &User, payload: &NotificationPayload) -> ChannelOutcome {
        let enabled = user.settings.as_ref().is_some_and(|s| s.push_enabled);
        if !enabled {
            return ChannelOutcome::Skipped;
        }
        let Some(channel) = &self.push else {
            return ChannelOutcome::Skipped;
        };
        let Some(subscription) = &user.push_subscription else {
            return ChannelOutcome::Skipped;
        };

        let push_json = payload.to_push_json();
        let send = channel.send(subscription, &push_json);
        match timeout(self.dispatch_timeout, send).await {
            Ok(Ok(())) => ChannelOutcome::Delivered,
            Ok(Err(ChannelError::InvalidSubscription(reason))) => {
                // The endpoint is permanently gone; forget it so future
                // cycles stop poking a dead registration.
                warn!(user_id = %user.id, %reason, "push subscription invalid — clearing");
                if let Err(e) = self.store.clear_push_subscription(&user.id).await {
                    warn!(user_id = %user.id, error = %e, "failed to clear push subscription");
                }
                ChannelOutcome::Invalid
            }
            Ok(Err(e)) => {
                warn!(user_id = %user.id, error = %e, "push send failed");
                ChannelOutcome::Failed
            }
            // Timeout is transient by definition — a slow push service is
            // not an invalid subscription.
            Err(_) => {
                warn!(
                    user_id = %user.id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "push send timed out"
                );
                ChannelOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcana_store::{NotificationSettings, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmail {
        sends: AtomicUsize,
        fail: bool,
    }

    impl CountingEmail {
        fn ok() -> Self {
            Self {
                sends: AtomicUsize::new(0),
                fail: false,
            }
        }
        fn failing() -> Self {
            Self {
                sends: AtomicUsize::new(0),
                fail: true,
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
            if self.fail {
                Err(ChannelError::SendFailed("smtp 451".to_string()))
            } else {
                Ok("<test@arcana.app>".to_string())
            }
        }
    }

    enum PushMode {
        Ok,
        Gone,
        Slow,
    }

    struct FakePush {
        sends: AtomicUsize,
        mode: PushMode,
    }

    impl FakePush {
        fn new(mode: PushMode) -> Self {
            Self {
                sends: AtomicUsize::new(0),
                mode,
            }
        }
        fn count(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PushChannel for FakePush {
        async fn send(
            &self,
            _subscription: &arcana_core::PushSubscription,
            _payload: &serde_json::Value,
        ) -> std::result::Result<(), ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                PushMode::Ok => Ok(()),
                PushMode::Gone => Err(ChannelError::InvalidSubscription("410 Gone".to_string())),
                PushMode::Slow => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    fn store_with_user(push: bool) -> (Arc<SqliteStore>, User) {
        let store = SqliteStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let user = User {
            id: "u1".to_string(),
            display_name: "Luna".to_string(),
            email: Some("luna@example.com".to_string()),
            settings: Some(NotificationSettings {
                daily_reminder_enabled: true,
                reminder_time: "09:00".to_string(),
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
        };
        store.upsert_user(&user).unwrap();
        (Arc::new(store), user)
    }

    fn router(
        store: Arc<SqliteStore>,
        email: Option<Arc<dyn EmailChannel>>,
        push: Option<Arc<dyn PushChannel>>,
    ) -> DispatchRouter {
        DispatchRouter::new(store, email, push, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn delivers_on_both_channels() {
        let (store, user) = store_with_user(true);
        let email = Arc::new(CountingEmail::ok());
        let push = Arc::new(FakePush::new(PushMode::Ok));
        let r = router(store.clone(), Some(email.clone()), Some(push.clone()));

        let now = Utc::now();
        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), now)
            .await
            .unwrap();

        assert_eq!(result.email, ChannelOutcome::Delivered);
        assert_eq!(result.push, ChannelOutcome::Delivered);
        assert_eq!(email.count(), 1);
        assert_eq!(push.count(), 1);
        let loaded = store.user("u1").await.unwrap().unwrap();
        assert_eq!(loaded.last_notified, Some(now));
    }

    #[tokio::test]
    async fn email_failure_still_marks_notified() {
        let (store, user) = store_with_user(false);
        let email = Arc::new(CountingEmail::failing());
        let r = router(store.clone(), Some(email), None);

        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.email, ChannelOutcome::Failed);
        assert!(result.attempted());
        let loaded = store.user("u1").await.unwrap().unwrap();
        assert!(loaded.last_notified.is_some());
    }

    #[tokio::test]
    async fn gone_subscription_is_cleared_and_email_unaffected() {
        let (store, user) = store_with_user(true);
        let email = Arc::new(CountingEmail::ok());
        let push = Arc::new(FakePush::new(PushMode::Gone));
        let r = router(store.clone(), Some(email), Some(push));

        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.email, ChannelOutcome::Delivered);
        assert_eq!(result.push, ChannelOutcome::Invalid);
        let loaded = store.user("u1").await.unwrap().unwrap();
        assert!(loaded.push_subscription.is_none());
    }

    #[tokio::test]
    async fn no_channels_still_marks_notified() {
        // Both channels unconfigured: the cycle decided the user was due,
        // so the day is still consumed.
        let (store, user) = store_with_user(false);
        let r = router(store.clone(), None, None);

        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.email, ChannelOutcome::Skipped);
        assert_eq!(result.push, ChannelOutcome::Skipped);
        assert!(!result.attempted());
        let loaded = store.user("u1").await.unwrap().unwrap();
        assert!(loaded.last_notified.is_some());
    }

    #[tokio::test]
    async fn missing_subscription_skips_push() {
        let (store, mut user) = store_with_user(true);
        user.push_subscription = None;
        store.upsert_user(&user).unwrap();
        let push = Arc::new(FakePush::new(PushMode::Ok));
        let r = router(store, None, Some(push.clone()));

        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.push, ChannelOutcome::Skipped);
        assert_eq!(push.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_push_times_out_as_failed() {
        let (store, user) = store_with_user(true);
        let push = Arc::new(FakePush::new(PushMode::Slow));
        let r = router(store.clone(), None, Some(push));

        let result = r
            .dispatch(&user, &NotificationPayload::daily_reminder(), Utc::now())
            .await
            .unwrap();

        // Timed out — transient, so the subscription survives.
        assert_eq!(result.push, ChannelOutcome::Failed);
        let loaded = store.user("u1").await.unwrap().unwrap();
        assert!(loaded.push_subscription.is_some());
    }
}
