use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use arcana_core::{config::PushConfig, PushSubscription};

use crate::{channel::PushChannel, error::ChannelError};

/// Web push adapter: POSTs the JSON payload to the subscription endpoint.
///
/// VAPID signing and payload encryption happen in the relay fronting the
/// push services; this adapter owns the one transport detail the engine
/// depends on — classifying the response. A 404/410 from the push service
/// means the browser registration no longer exists and the subscription
/// must be forgotten; everything else is transient.
pub struct HttpPusher {
    client: reqwest::Client,
    ttl_secs: u64,
}

impl HttpPusher {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            ttl_secs: config.ttl_secs,
        }
    }
}

#[async_trait]
impl PushChannel for HttpPusher {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        let status = response.status();
        classify_status(status)?;
        debug!(endpoint = %subscription.endpoint, status = %status, "push accepted");
        Ok(())
    }
}

/// Map a push service response status onto the channel error taxonomy.
fn classify_status(status: StatusCode) -> Result<(), ChannelError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(ChannelError::InvalidSubscription(
            format!("push service returned {status}"),
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ChannelError::AuthFailed(format!("push service returned {status}")))
        }
        other => Err(ChannelError::SendFailed(format!(
            "push service returned {other}"
        ))),
    }
}
