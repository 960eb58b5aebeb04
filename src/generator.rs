use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Random six-digit code in `100000..=999999`
pub fn random_six_digits() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Date stamp in `YYMMDD` form, used to prefix reference numbers
pub fn yymmdd(date: DateTime<Utc>) -> String {
    date.format("%y%m%d").to_string()
}

/// Standard (padded) base64 of a UTF-8 string
pub fn encode_base64(data: &str) -> String {
    STANDARD.encode(data.as_bytes())
}

pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Round `value` to the nearest `1 / nearest` (tenths by default)
pub fn round_to(value: f64, nearest: Option<f64>) -> f64 {
    let nearest = nearest.unwrap_or(10.0);
    (value * nearest).round() / nearest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_random_six_digits_shape() {
        for _ in 0..200 {
            let code = random_six_digits();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn test_yymmdd() {
        let date = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(yymmdd(date), "240307");
    }

    #[test]
    fn test_encode_base64() {
        assert_eq!(encode_base64("hello"), "aGVsbG8=");
        assert_eq!(encode_base64(""), "");
    }

    #[test]
    fn test_generate_uuid_is_v4() {
        let id = Uuid::parse_str(&generate_uuid()).unwrap();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.345, None), 2.3);
        assert_eq!(round_to(2.346, Some(100.0)), 2.35);
        assert_eq!(round_to(7.0, Some(1.0)), 7.0);
    }
}
