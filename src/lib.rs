//! Legit Kit Library
//!
//! Backend building blocks: a paginating repository facade over pluggable
//! document stores, batched bulk mail, token authentication, OTPs and date
//! helpers, plus a reference axum service wiring them together.

pub mod auth;
pub mod config;
pub mod constants;
pub mod dates;
pub mod db;
pub mod error;
pub mod extract;
pub mod generator;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod otp;
pub mod pagination;
pub mod routes;

pub use auth::{AuthGate, Claims, JwtService};
pub use config::Config;
pub use db::Repository;
pub use error::{AppError, Result};
pub use mail::Mailer;
pub use otp::OtpService;

/// Application state shared across all handlers
pub struct AppState<S> {
    pub repo: Repository<S>,
    pub auth: AuthGate<JwtService>,
    pub mailer: Mailer,
    pub otp: OtpService,
    pub config: Config,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            auth: self.auth.clone(),
            mailer: self.mailer.clone(),
            otp: self.otp.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: db::Storage> AppState<S> {
    /// Create a new AppState over the given store, transport and configuration
    ///
    /// Fails when the OTP settings do not describe a usable service.
    pub fn new(
        store: S,
        transport: std::sync::Arc<dyn mail::MailTransport>,
        config: Config,
    ) -> Result<Self> {
        Ok(Self {
            repo: Repository::new(store),
            auth: AuthGate::new(JwtService::from_config(&config)),
            mailer: Mailer::new(transport, &config.mail),
            otp: OtpService::from_config(&config)?,
            config,
        })
    }

    /// Hash a password at the configured bcrypt cost
    pub fn hash_password(&self, password: &str) -> Result<String> {
        auth::hash_password(password, self.config.bcrypt_cost)
    }
}
