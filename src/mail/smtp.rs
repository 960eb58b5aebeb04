use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Delivery, Envelope, MailError, MailTransport};
use crate::config::MailConfig;

/// SMTP delivery over lettre's pooled tokio transport
#[derive(Clone)]
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Port 465 uses implicit TLS; with credentials, STARTTLS is required;
    /// otherwise the relay is assumed local and plain.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let builder = match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => {
                let builder = if config.smtp_port == 465 {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                };
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host),
        };

        tracing::info!(
            "SMTP transport configured for {}:{}",
            config.smtp_host,
            config.smtp_port
        );

        Ok(Self {
            inner: builder.port(config.smtp_port).build(),
        })
    }
}

/// Build the wire message: plain, HTML, or both as alternatives
fn build_message(envelope: &Envelope) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(envelope.from.parse::<Mailbox>()?)
        .to(envelope.to.parse::<Mailbox>()?)
        .subject(envelope.subject.as_str());

    for address in &envelope.bcc {
        builder = builder.bcc(address.parse::<Mailbox>()?);
    }

    let message = match (&envelope.text, &envelope.html) {
        (Some(text), Some(html)) => {
            builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))?
        }
        (None, Some(html)) => builder.singlepart(SinglePart::html(html.clone()))?,
        (text, None) => builder.singlepart(SinglePart::plain(text.clone().unwrap_or_default()))?,
    };

    Ok(message)
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, MailError> {
        let message = build_message(envelope)?;
        let response = self.inner.send(message).await?;

        let text: Vec<&str> = response.message().collect();
        let delivery = Delivery {
            response: format!("{} {}", response.code(), text.join(" ")),
        };

        if !response.is_positive() {
            return Err(MailError::Rejected(delivery.response));
        }
        Ok(delivery)
    }
}
