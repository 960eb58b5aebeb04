use std::env;
use std::time::Duration;

use chrono::Utc;

use crate::constants::{
    BULK_BATCH_SIZE, BULK_INTERVAL_SECS, DEFAULT_BCRYPT_COST, DEFAULT_JWT_EXPIRATION_SECS,
    DEFAULT_OTP_TTL,
};
use crate::otp::expiry_from;

/// Keys that must be present before the service starts
pub const REQUIRED_KEYS: &[&str] = &["DATABASE_URL", "JWT_SECRET"];

// Mirrors bcrypt's cost bounds, which the crate keeps private
const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;

/// Outgoing mail settings
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
    pub batch_size: usize,
    pub batch_interval: Duration,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: i64,
    pub bcrypt_cost: u32,
    pub otp_secret: String,
    pub otp_ttl: String,
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails on the first call if any of [`REQUIRED_KEYS`] is unset, naming
    /// every missing key at once.
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        Self::require(REQUIRED_KEYS)?;

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| "Invalid DATABASE_MAX_CONNECTIONS")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET is required")?;

        let jwt_expiration_secs = env::var("JWT_EXPIRATION_SECS")
            .unwrap_or_else(|_| DEFAULT_JWT_EXPIRATION_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid JWT_EXPIRATION_SECS")?;

        let bcrypt_cost = env::var("BCRYPT_COST")
            .unwrap_or_else(|_| DEFAULT_BCRYPT_COST.to_string())
            .parse()
            .map_err(|_| "Invalid BCRYPT_COST")?;
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&bcrypt_cost) {
            return Err(format!(
                "BCRYPT_COST must be between {} and {}",
                BCRYPT_MIN_COST,
                BCRYPT_MAX_COST
            ));
        }

        let otp_secret = env::var("OTP_SECRET").unwrap_or_else(|_| jwt_secret.clone());
        let otp_ttl = env::var("OTP_TTL").unwrap_or_else(|_| DEFAULT_OTP_TTL.to_string());
        expiry_from(Utc::now(), &otp_ttl).map_err(|e| format!("Invalid OTP_TTL: {}", e))?;

        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .map_err(|_| "Invalid SMTP_PORT")?;

        let batch_size: usize = env::var("BULK_BATCH_SIZE")
            .unwrap_or_else(|_| BULK_BATCH_SIZE.to_string())
            .parse()
            .map_err(|_| "Invalid BULK_BATCH_SIZE")?;
        if batch_size == 0 {
            return Err("BULK_BATCH_SIZE must be greater than zero".to_string());
        }

        let batch_interval_secs: u64 = env::var("BULK_INTERVAL_SECS")
            .unwrap_or_else(|_| BULK_INTERVAL_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid BULK_INTERVAL_SECS")?;

        let mail = MailConfig {
            smtp_host,
            smtp_port,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            from_address: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            batch_size,
            batch_interval: Duration::from_secs(batch_interval_secs),
        };

        tracing::info!("Environment variables loaded");

        Ok(Config {
            server_host,
            server_port,
            database_url,
            database_max_connections,
            allowed_origins,
            environment,
            jwt_secret,
            jwt_expiration_secs,
            bcrypt_cost,
            otp_secret,
            otp_ttl,
            mail,
        })
    }

    /// Check that every key is set to a non-empty value
    pub fn require(keys: &[&str]) -> Result<(), String> {
        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| env::var(key).map(|v| v.is_empty()).unwrap_or(true))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("{} is required", missing.join(", ")))
        }
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_every_missing_key() {
        let err = Config::require(&[
            "LEGIT_KIT_TEST_MISSING_ONE",
            "PATH",
            "LEGIT_KIT_TEST_MISSING_TWO",
        ])
        .unwrap_err();

        assert!(err.contains("LEGIT_KIT_TEST_MISSING_ONE"));
        assert!(err.contains("LEGIT_KIT_TEST_MISSING_TWO"));
        assert!(!err.contains("PATH"));
    }

    #[test]
    fn test_require_passes_when_present() {
        assert!(Config::require(&["PATH"]).is_ok());
        assert!(Config::require(&[]).is_ok());
    }
}
