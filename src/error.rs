use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::constants::ERR_INTERNAL;
use crate::otp::OtpError;

/// Field-level detail attached to a validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{entity} not found")]
    NotFound { entity: String, filter: String },

    #[error("{message}")]
    Repository { message: String, status: StatusCode },

    #[error("Password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure carrying a single field error
    pub fn invalid_field(field: &str, message: &str) -> Self {
        AppError::Validation {
            message: message.to_string(),
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn not_found(entity: &str, filter: impl std::fmt::Debug) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            filter: format!("{:?}", filter),
        }
    }

    /// Storage failure on the read path (find, count, aggregate)
    pub fn read_failure(err: impl std::fmt::Display) -> Self {
        AppError::Repository {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Storage failure on the write path (create, update, delete)
    pub fn write_failure(err: impl std::fmt::Display) -> Self {
        AppError::Repository {
            message: err.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Repository { status, .. } => *status,
            AppError::PasswordHash(_) | AppError::Otp(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// Malformed requests are validation failures, whichever part was malformed

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid_field("query", &rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::invalid_field("path", &rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid_field("body", &rejection.body_text())
    }
}

/// Implement IntoResponse to convert AppError into HTTP responses
///
/// Body shape: `{ "statusCode": .., "message": .., "errors"?: [..] }`.
/// Server-side failures are logged and answered with a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::Validation { message, errors } => {
                tracing::warn!("Validation failed: {}", message);
                json!({
                    "statusCode": status.as_u16(),
                    "message": message,
                    "errors": errors,
                })
            }
            AppError::NotFound { entity, filter } => {
                tracing::debug!("{} not found for {}", entity, filter);
                json!({
                    "statusCode": status.as_u16(),
                    "message": self.to_string(),
                })
            }
            _ if status.is_server_error() => {
                tracing::error!("Request failed: {:?}", self);
                json!({
                    "statusCode": status.as_u16(),
                    "message": ERR_INTERNAL,
                })
            }
            _ => json!({
                "statusCode": status.as_u16(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_of(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_carries_field_details() {
        let (status, body) = body_of(AppError::invalid_field("email", "Email is invalid")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["message"], "Email is invalid");
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_not_found_names_entity() {
        let (status, body) = body_of(AppError::not_found("Subscriber", "id=1")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Subscriber not found");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_read_failure_hides_internal_message() {
        let (status, body) = body_of(AppError::read_failure("connection reset by peer")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ERR_INTERNAL);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_source_message() {
        let (status, body) = body_of(AppError::write_failure("duplicate key")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "duplicate key");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_401() {
        let (status, body) = body_of(AppError::Unauthorized("No token provided".into())).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], 401);
        assert_eq!(body["message"], "No token provided");
    }
}
