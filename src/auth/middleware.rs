//! Authentication Middleware
//! Mission: Authorize requests from the bearer alone (fast path, no store access)

use crate::auth::{
    jwt::{BearerError, JwtHandler},
    models::{Claims, Role},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Cookie carrying the bearer for browser clients
pub const SESSION_COOKIE: &str = "session_guard";

/// Find the bearer in `Authorization: Bearer ...` or the session cookie
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Auth middleware that validates the bearer and exposes its claims to handlers
pub async fn auth_middleware(
    State(jwt_handler): State<Arc<JwtHandler>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_from_headers(req.headers()).ok_or(AuthError::MissingToken)?;

    let claims = jwt_handler.verify(&token).map_err(|e| match e {
        BearerError::Expired => AuthError::ExpiredToken,
        BearerError::Malformed => AuthError::InvalidToken,
    })?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Reject non-admin claims
pub fn require_admin(claims: &Claims) -> Result<(), AuthError> {
    if claims.role == Role::Admin {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Auth error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    ExpiredToken,
    InvalidToken,
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "Missing authorization token",
            ),
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "Your session has expired",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid authorization token",
            ),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Insufficient permissions",
            ),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
