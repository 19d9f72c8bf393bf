use async_trait::async_trait;

use arcana_core::PushSubscription;

use crate::error::ChannelError;

/// Transactional email delivery.
///
/// Implementations must be `Send + Sync` so one adapter can serve the
/// scheduler cycle and every registry job task concurrently. `send` takes
/// `&self` for the same reason — a connected transport sends without a
/// mutable borrow.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    /// Stable lowercase identifier, used in logs and outcome reporting.
    fn name(&self) -> &str {
        "email"
    }

    /// Deliver one message. Returns the message id assigned to the send.
    ///
    /// `html` and `text` are the two multipart alternatives; both arrive
    /// fully rendered — no templating happens at this layer.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<String, ChannelError>;
}

/// Web push delivery.
#[async_trait]
pub trait PushChannel: Send + Sync {
    fn name(&self) -> &str {
        "push"
    }

    /// Deliver one payload to a subscription endpoint.
    ///
    /// Must return [`ChannelError::InvalidSubscription`] when the push
    /// service reports the endpoint permanently gone, and any other variant
    /// for transient trouble — the router treats the two very differently.
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &serde_json::Value,
    ) -> Result<(), ChannelError>;
}
