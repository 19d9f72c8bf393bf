use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};
use uuid::Uuid;

use arcana_core::config::SmtpConfig;
use async_trait::async_trait;

use crate::{channel::EmailChannel, error::ChannelError};

/// Async SMTP adapter for the email channel.
///
/// Built once at startup from the `[channels.smtp]` config section; lettre
/// pools relay connections internally, so the adapter is shared behind an
/// `Arc` and sends concurrently. Messages go out as multipart alternative
/// (plain text + HTML) with a generated Message-ID that is returned to the
/// caller for log correlation.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
    id_domain: String,
}

impl SmtpMailer {
    /// Build the transport from config. The relay connection itself is
    /// established lazily on first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, ChannelError> {
        let from_mailbox: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| ChannelError::InvalidAddress(format!("from address: {e}")))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ChannelError::ConfigError(format!("smtp relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        // Message-IDs are "<uuid@sender-domain>"; fall back to the full
        // address when it has no domain part.
        let id_domain = config
            .from_address
            .split('@')
            .nth(1)
            .unwrap_or(&config.from_address)
            .to_string();

        debug!(host = %config.host, port = config.port, "SMTP mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from_mailbox,
            id_domain,
        })
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from_mailbox", &self.from_mailbox)
            .field("id_domain", &self.id_domain)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmailChannel for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<String, ChannelError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| ChannelError::InvalidAddress(format!("{to}: {e}")))?;

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.id_domain);
        let message = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .map_err(|e| ChannelError::SendFailed(format!("build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        info!(message_id = %message_id, "email sent");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some("secret".to_string()),
            from_address: "readings@arcana.app".to_string(),
            from_name: "Arcana".to_string(),
            use_tls: true,
        }
    }

    #[test]
    fn builds_from_valid_config() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        assert_eq!(mailer.id_domain, "arcana.app");
        assert_eq!(EmailChannel::name(&mailer), "email");
    }

    #[test]
    fn rejects_bad_from_address() {
        let mut cfg = config();
        cfg.from_address = "not an address".to_string();
        let err = SmtpMailer::new(&cfg).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidAddress(_)));
    }
}
