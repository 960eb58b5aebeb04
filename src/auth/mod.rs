//! Token authentication, roles and password handling.

pub mod jwt;

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Query,
    http::{header, HeaderMap, Uri},
};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ERR_EMAIL_OR_PHONE_REQUIRED, ERR_NO_TOKEN, ERR_PASSWORD_REQUIRED, ERR_UNAUTHORIZED,
};
use crate::error::{AppError, FieldError, Result};

pub use jwt::{Claims, JwtService};

/// Decodes a token into trusted claims
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    type Error: Display + Send;

    async fn verify(&self, token: &str) -> std::result::Result<Claims, Self::Error>;
}

/// Turns a presented token into claims, or an Unauthorized error
pub struct AuthGate<V> {
    verifier: Arc<V>,
}

impl<V> Clone for AuthGate<V> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<V: TokenVerifier> AuthGate<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// A missing token fails before the verifier is consulted; every
    /// verifier rejection surfaces as the same Unauthorized error.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Claims> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AppError::Unauthorized(ERR_NO_TOKEN.to_string())),
        };

        self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!("Token rejected: {}", e);
            AppError::Unauthorized(ERR_UNAUTHORIZED.to_string())
        })
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the Authorization header, else the `token` query parameter
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Roles allowed through the admin guard
    pub const ADMINS: &'static [Role] = &[Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

/// Pass only if the claims carry one of `allowed`
pub fn require_role(claims: &Claims, allowed: &[Role]) -> Result<()> {
    match claims.role {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => {
            tracing::warn!(
                "Role {:?} of {} not in {:?}",
                claims.role,
                claims.sub,
                allowed
            );
            Err(AppError::Unauthorized(ERR_UNAUTHORIZED.to_string()))
        }
    }
}

// ============================================================================
// Passwords
// ============================================================================

/// Hash a password using bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    if password.is_empty() {
        return Err(AppError::invalid_field("password", ERR_PASSWORD_REQUIRED));
    }
    Ok(bcrypt::hash(password, cost)?)
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Sign-in or sign-up payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn validate(&self) -> Result<()> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let mut errors = Vec::new();

        if !present(&self.email) && !present(&self.phone_number) {
            errors.push(FieldError::new("email", ERR_EMAIL_OR_PHONE_REQUIRED));
        }
        if !present(&self.password) {
            errors.push(FieldError::new("password", ERR_PASSWORD_REQUIRED));
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts "good", counts every call
    #[derive(Default)]
    struct CountingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenVerifier for CountingVerifier {
        type Error = String;

        async fn verify(&self, token: &str) -> std::result::Result<Claims, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "good" {
                Ok(claims(Some(Role::User)))
            } else {
                Err("bad signature".into())
            }
        }
    }

    fn claims(role: Option<Role>) -> Claims {
        Claims {
            sub: "user-1".into(),
            role,
            exp: 0,
            iat: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_token_skips_verifier() {
        let gate = AuthGate::new(CountingVerifier::default());

        let err = gate.authenticate(None).await.unwrap_err();
        assert!(matches!(&err, AppError::Unauthorized(m) if m == ERR_NO_TOKEN));
        assert!(gate.authenticate(Some("")).await.is_err());
        assert_eq!(gate.verifier().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verifier_decides() {
        let gate = AuthGate::new(CountingVerifier::default());

        assert_eq!(gate.authenticate(Some("good")).await.unwrap().sub, "user-1");
        let err = gate.authenticate(Some("forged")).await.unwrap_err();
        assert!(matches!(&err, AppError::Unauthorized(m) if m == ERR_UNAUTHORIZED));
        assert_eq!(gate.verifier().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let uri: Uri = "/api/subscribers?token=from-query".parse().unwrap();

        assert_eq!(extract_token(&headers, &uri).as_deref(), Some("from-header"));
        assert_eq!(
            extract_token(&HeaderMap::new(), &uri).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            extract_token(&HeaderMap::new(), &"/api/subscribers".parse().unwrap()),
            None
        );
    }

    #[test]
    fn test_non_bearer_header_falls_back_to_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let uri: Uri = "/x?page=2&token=q".parse().unwrap();

        assert_eq!(extract_token(&headers, &uri).as_deref(), Some("q"));
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&claims(Some(Role::Admin)), Role::ADMINS).is_ok());
        assert!(require_role(&claims(Some(Role::SuperAdmin)), Role::ADMINS).is_ok());
        assert!(require_role(&claims(Some(Role::User)), Role::ADMINS).is_err());
        assert!(require_role(&claims(None), Role::ADMINS).is_err());
        assert!(require_role(&claims(Some(Role::Admin)), &[Role::SuperAdmin]).is_err());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::SuperAdmin.as_str(), "super_admin");
        assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), "super_admin");
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
        assert!(hash_password("", 4).is_err());
    }

    #[test]
    fn test_credentials_validation() {
        let ok = Credentials {
            phone_number: Some("+15550100".into()),
            password: Some("pw".into()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let err = Credentials::default().validate().unwrap_err();
        match err {
            AppError::Validation { message, errors } => {
                assert_eq!(message, ERR_EMAIL_OR_PHONE_REQUIRED);
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[1].field, "password");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
