//! Delivery payload types — shared between the scheduler, the job registry
//! and all channel adapters.

use serde::{Deserialize, Serialize};

/// Channel-agnostic notification content. Built once per cycle (or per
/// ad-hoc job) and never mutated afterwards; each adapter maps it onto its
/// own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Short headline — email subject / push title.
    pub title: String,
    /// Rendered body text. Templating happens upstream; by the time a
    /// payload reaches a channel this is final copy.
    pub body: String,
    /// Click-through target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Icon reference for channels that render one (web push).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationPayload {
    /// The recurring daily-reminder payload.
    pub fn daily_reminder() -> Self {
        Self {
            title: "Your daily reading awaits".to_string(),
            body: "Take a moment for yourself — today's card is ready.".to_string(),
            url: Some("/daily".to_string()),
            icon: Some("icon-192.png".to_string()),
        }
    }

    /// JSON body handed to the push transport.
    pub fn to_push_json(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "body":  self.body,
            "url":   self.url,
            "icon":  self.icon,
        })
    }
}

/// Opaque web-push transport credential captured by the frontend service
/// worker. Stored as a JSON column on the user record; forgotten when the
/// push service reports the endpoint gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Push service URL unique to this browser registration.
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

/// Client key material the push service expects alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}
