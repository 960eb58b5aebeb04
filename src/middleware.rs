use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::auth::{extract_token, require_role, AuthGate, Claims, Role, TokenVerifier};
use crate::constants::ERR_NO_TOKEN;
use crate::error::AppError;

/// Log method and path of every request
pub async fn request_logger(request: Request, next: Next) -> Response {
    tracing::info!("{} {}", request.method(), request.uri());
    next.run(request).await
}

/// Authenticate, check the role when `allowed` is given, then attach the claims
async fn guard<V: TokenVerifier>(
    gate: &AuthGate<V>,
    allowed: Option<&[Role]>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers(), request.uri());
    let claims = gate.authenticate(token.as_deref()).await?;
    if let Some(allowed) = allowed {
        require_role(&claims, allowed)?;
    }
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Reject requests without a valid token; attach the claims otherwise
pub async fn require_auth<V: TokenVerifier>(
    State(gate): State<AuthGate<V>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    guard(&gate, None, request, next).await
}

/// Like [`require_auth`], and the role must be admin or super admin
pub async fn require_admin<V: TokenVerifier>(
    State(gate): State<AuthGate<V>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    guard(&gate, Some(Role::ADMINS), request, next).await
}

pub async fn require_super_admin<V: TokenVerifier>(
    State(gate): State<AuthGate<V>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    guard(&gate, Some(&[Role::SuperAdmin]), request, next).await
}

/// Claims attached by one of the auth guards
pub struct AuthClaims(pub Claims);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthClaims {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthClaims)
            .ok_or_else(|| AppError::Unauthorized(ERR_NO_TOKEN.to_string()))
    }
}
