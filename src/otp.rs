use chrono::{DateTime, Duration, Months, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::Config;
use crate::generator::random_six_digits;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OtpError {
    #[error("Invalid duration value: {0}")]
    InvalidDuration(String),

    #[error("Invalid duration unit: {0}")]
    InvalidUnit(char),

    #[error("Duration overflows the calendar: {0}")]
    OutOfRange(String),

    #[error("Invalid OTP secret")]
    InvalidSecret,
}

/// Stored form of an issued code
///
/// Only the keyed digest is kept; the plain code goes to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Otp {
    pub digest: String,
    pub expiry_date: DateTime<Utc>,
}

pub fn generate_otp() -> String {
    random_six_digits()
}

/// An OTP has expired once its expiry instant is reached
pub fn is_expired(otp: &Otp, now: DateTime<Utc>) -> bool {
    otp.expiry_date <= now
}

/// Add a `<n><unit>` duration to `now`
///
/// Units: `s` seconds, `m` minutes, `h` hours, `d` days, `w` weeks,
/// `M` calendar months, `y` calendar years.
pub fn expiry_from(now: DateTime<Utc>, duration: &str) -> Result<DateTime<Utc>, OtpError> {
    let unit = duration
        .chars()
        .last()
        .ok_or_else(|| OtpError::InvalidDuration(duration.to_string()))?;
    let value: i64 = duration[..duration.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| OtpError::InvalidDuration(duration.to_string()))?;

    let out_of_range = || OtpError::OutOfRange(duration.to_string());
    let months = |n: i64| -> Result<DateTime<Utc>, OtpError> {
        let n = u32::try_from(n).map_err(|_| out_of_range())?;
        now.checked_add_months(Months::new(n)).ok_or_else(out_of_range)
    };

    let offset = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        'w' => Duration::try_weeks(value),
        'M' => return months(value),
        'y' => return months(value.checked_mul(12).ok_or_else(out_of_range)?),
        other => return Err(OtpError::InvalidUnit(other)),
    };

    offset
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(out_of_range)
}

/// Keyed digest of a code (HMAC-SHA256, hex)
pub fn digest(code: &str, secret: &str) -> Result<String, OtpError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| OtpError::InvalidSecret)?;
    mac.update(code.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Issues and checks one-time passwords
#[derive(Debug, Clone)]
pub struct OtpService {
    secret: String,
    ttl: String,
}

impl OtpService {
    /// Fails when `ttl` is not a valid duration, so a bad setting is caught at startup
    pub fn new(secret: impl Into<String>, ttl: impl Into<String>) -> Result<Self, OtpError> {
        let ttl = ttl.into();
        expiry_from(Utc::now(), &ttl)?;
        Ok(Self {
            secret: secret.into(),
            ttl,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, OtpError> {
        Self::new(config.otp_secret.clone(), config.otp_ttl.clone())
    }

    /// Generate a code; returns the plain code and its stored form
    pub fn issue(&self, now: DateTime<Utc>) -> Result<(String, Otp), OtpError> {
        let code = generate_otp();
        let otp = Otp {
            digest: digest(&code, &self.secret)?,
            expiry_date: expiry_from(now, &self.ttl)?,
        };
        Ok((code, otp))
    }

    /// True when `code` matches and the OTP has not expired
    pub fn verify(&self, otp: &Otp, code: &str, now: DateTime<Utc>) -> bool {
        if is_expired(otp, now) {
            tracing::debug!("OTP expired at {}", otp.expiry_date);
            return false;
        }

        let Ok(expected) = hex::decode(&otp.digest) else {
            tracing::warn!("Stored OTP digest is not valid hex");
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(code.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OTP_DIGITS;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_units() {
        let now = now();
        assert_eq!(expiry_from(now, "30s").unwrap(), now + Duration::seconds(30));
        assert_eq!(expiry_from(now, "5m").unwrap(), now + Duration::minutes(5));
        assert_eq!(expiry_from(now, "2h").unwrap(), now + Duration::hours(2));
        assert_eq!(expiry_from(now, "1d").unwrap(), now + Duration::days(1));
        assert_eq!(expiry_from(now, "2w").unwrap(), now + Duration::days(14));
        assert_eq!(
            expiry_from(now, "1M").unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
        assert_eq!(
            expiry_from(now, "1y").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_expiry_rejects_bad_input() {
        assert_eq!(
            expiry_from(now(), "xm"),
            Err(OtpError::InvalidDuration("xm".to_string()))
        );
        assert_eq!(expiry_from(now(), "5q"), Err(OtpError::InvalidUnit('q')));
        assert!(expiry_from(now(), "").is_err());
        assert!(expiry_from(now(), "m").is_err());
    }

    #[test]
    fn test_is_expired_boundary() {
        let otp = Otp {
            digest: String::new(),
            expiry_date: now(),
        };
        assert!(is_expired(&otp, now()));
        assert!(!is_expired(&otp, now() - Duration::seconds(1)));
    }

    #[test]
    fn test_issue_and_verify() {
        let service = OtpService::new("otp-secret", "5m").unwrap();
        let (code, otp) = service.issue(now()).unwrap();

        assert_eq!(code.len(), OTP_DIGITS);
        assert_ne!(otp.digest, code);
        assert!(service.verify(&otp, &code, now() + Duration::minutes(4)));
        assert!(!service.verify(&otp, "000000", now()));
        assert!(!service.verify(&otp, &code, now() + Duration::minutes(5)));
    }

    #[test]
    fn test_verify_with_other_secret_fails() {
        let issuer = OtpService::new("secret-a", "5m").unwrap();
        let checker = OtpService::new("secret-b", "5m").unwrap();
        let (code, otp) = issuer.issue(now()).unwrap();

        assert!(!checker.verify(&otp, &code, now()));
    }

    #[test]
    fn test_service_rejects_bad_ttl() {
        assert!(OtpService::new("secret", "5x").is_err());
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(
            digest("123456", "k").unwrap(),
            digest("123456", "k").unwrap()
        );
        assert_ne!(
            digest("123456", "k").unwrap(),
            digest("123457", "k").unwrap()
        );
    }
}
