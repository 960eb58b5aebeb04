//! Outgoing mail: the transport contract, single sends and bulk sends.

pub mod dispatch;
pub mod smtp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::config::MailConfig;

pub use dispatch::{partition, BatchJob, BatchOutcome, BulkReport, Recipients};
pub use smtp::SmtpTransport;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// A message ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub bcc: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

/// What the transport said after accepting a message
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Delivery {
    pub response: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, MailError>;
}

/// Sends mail through a [`MailTransport`] from one configured address
#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    from: String,
    batch_size: usize,
    interval: Duration,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, config: &MailConfig) -> Self {
        Self {
            transport,
            from: config.from_address.clone(),
            batch_size: config.batch_size,
            interval: config.batch_interval,
        }
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }

    /// The job a bulk send to `recipients` would run
    pub fn job(&self, recipients: Recipients) -> BatchJob {
        BatchJob::new(recipients)
            .batch_size(self.batch_size)
            .interval(self.interval)
    }

    /// Send one message; failures are logged and come back as `None`
    pub async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Option<Delivery> {
        let envelope = Envelope {
            from: self.from.clone(),
            to: to.to_string(),
            bcc: Vec::new(),
            subject: subject.to_string(),
            text: text.map(str::to_string),
            html: html.map(str::to_string),
        };

        match self.transport.send(&envelope).await {
            Ok(delivery) => {
                tracing::info!("Email sent: {}", delivery.response);
                Some(delivery)
            }
            Err(e) => {
                tracing::error!("Error sending email to {}: {}", to, e);
                None
            }
        }
    }

    /// Send one message to many recipients in paced batches
    ///
    /// Each batch goes out addressed to the sender with the batch in Bcc, so
    /// recipients never see each other.
    pub async fn send_bulk(
        &self,
        subject: &str,
        recipients: Recipients,
        text: Option<String>,
        html: Option<String>,
    ) -> BulkReport<Delivery> {
        let job_id = format!("mail-{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let template = Envelope {
            from: self.from.clone(),
            to: self.from.clone(),
            bcc: Vec::new(),
            subject: subject.to_string(),
            text,
            html,
        };

        self.job(recipients)
            .run(&job_id, |batch| {
                let transport = Arc::clone(&self.transport);
                let envelope = Envelope {
                    bcc: batch,
                    ..template.clone()
                };
                async move { transport.send(&envelope).await }
            })
            .await
    }
}
