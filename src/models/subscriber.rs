use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldError, Result};

/// Newsletter subscriber payload as stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewSubscriberRequest {
    pub email: String,
    pub name: Option<String>,
}

impl NewSubscriberRequest {
    /// Validate and normalize into a stored subscriber
    pub fn into_subscriber(self) -> Result<Subscriber> {
        let email = self.email.trim().to_lowercase();
        if !Subscriber::validate_email(&email) {
            return Err(AppError::invalid_field("email", "Email is invalid"));
        }

        Ok(Subscriber {
            email,
            name: self
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            active: true,
        })
    }
}

impl Subscriber {
    /// One `@` with something on both sides and a dot in the domain
    pub fn validate_email(email: &str) -> bool {
        match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

impl NewsletterRequest {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.subject.trim().is_empty() {
            errors.push(FieldError::new("subject", "Subject is required"));
        }
        if self.text.is_none() && self.html.is_none() {
            errors.push(FieldError::new("text", "Either text or html body is required"));
        }

        match errors.first() {
            None => Ok(()),
            Some(first) => Err(AppError::Validation {
                message: first.message.clone(),
                errors,
            }),
        }
    }
}

/// Accepted bulk send
#[derive(Debug, Serialize)]
pub struct NewsletterResponse {
    pub recipients: usize,
    pub batches: usize,
}
