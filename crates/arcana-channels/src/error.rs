use thiserror::Error;

/// Errors that can occur within any channel adapter.
///
/// `InvalidSubscription` is the only variant with routing significance: it
/// marks a push endpoint as permanently dead, and the router reacts by
/// clearing the stored subscription. Everything else is a soft failure the
/// next day's cycle naturally retries.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The push service reported the endpoint permanently gone
    /// (HTTP 404/410 — the browser registration no longer exists).
    #[error("Subscription no longer valid: {0}")]
    InvalidSubscription(String),

    /// The channel rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A destination address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The channel-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ChannelError {
    /// True when retrying can never succeed for this destination.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ChannelError::InvalidSubscription(_) | ChannelError::InvalidAddress(_)
        )
    }
}
