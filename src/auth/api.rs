//! Authentication API Endpoints
//! Mission: Login, liveness, sign-out and bearer refresh over HTTP

use crate::auth::{
    account_store::CredentialStore,
    authenticator::{AuthError, Authenticator},
    jwt::{JwtHandler, SignedBearer},
    liveness::{Indeterminate, Liveness, LivenessVerifier, Verdict},
    middleware::{bearer_from_headers, SESSION_COOKIE},
    models::{
        AccountResponse, AccountUpdate, ChangePasswordRequest, Claims, LivenessResponse,
        LoginRequest, LoginResponse, MeResponse, RefreshResponse, MIN_PASSWORD_LEN,
    },
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Cookie attributes for the session cookie
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    fn attributes(&self) -> &'static str {
        if self.secure {
            "Path=/; HttpOnly; SameSite=Lax; Secure"
        } else {
            "Path=/; HttpOnly; SameSite=Lax"
        }
    }

    /// Cookie that lives exactly as long as the bearer it carries
    pub fn session_cookie(&self, bearer: &SignedBearer) -> String {
        format!(
            "{}={}; Max-Age={}; {}",
            SESSION_COOKIE,
            bearer.token,
            bearer.expires_in(),
            self.attributes()
        )
    }

    pub fn cleared_cookie(&self) -> String {
        format!("{}=; Max-Age=0; {}", SESSION_COOKIE, self.attributes())
    }
}

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<dyn CredentialStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub authenticator: Arc<Authenticator>,
    pub liveness: Arc<LivenessVerifier>,
    pub cookies: CookiePolicy,
}

impl AuthState {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt_handler: Arc<JwtHandler>,
        cookies: CookiePolicy,
    ) -> Self {
        Self {
            authenticator: Arc::new(Authenticator::new(store.clone(), jwt_handler.clone())),
            liveness: Arc::new(LivenessVerifier::new(store.clone(), jwt_handler.clone())),
            store,
            jwt_handler,
            cookies,
        }
    }
}

/// Run store and bcrypt work off the async workers
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AuthApiError>
where
    F: FnOnce() -> Result<T, AuthApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Blocking auth task failed: {}", e);
        AuthApiError::InternalError
    })?
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AuthApiError> {
    let authenticator = state.authenticator.clone();
    let session = blocking(move || {
        authenticator
            .authenticate(&payload.email, &payload.password)
            .map_err(AuthApiError::from)
    })
    .await?;

    let cookie = state.cookies.session_cookie(&session.bearer);
    let body = LoginResponse {
        expires_in: session.bearer.expires_in(),
        expires_at: session.bearer.claims.exp,
        token: session.bearer.token,
        account: AccountResponse::from_account(&session.account),
    };

    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Map a liveness verdict onto the wire. Indeterminate outcomes are 5xx, never `valid: false`.
pub fn liveness_response(verdict: Verdict) -> Response {
    match verdict {
        Ok(Liveness::Valid) => Json(LivenessResponse {
            valid: true,
            reason: None,
        })
        .into_response(),
        Ok(Liveness::Invalid(reason)) => Json(LivenessResponse {
            valid: false,
            reason: Some(reason),
        })
        .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "liveness_indeterminate",
                "message": "Session could not be verified right now",
            })),
        )
            .into_response(),
    }
}

/// Session liveness check - POST /api/auth/verify-session
pub async fn verify_session(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let Some(bearer) = bearer_from_headers(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(LivenessResponse {
                valid: false,
                reason: None,
            }),
        )
            .into_response();
    };

    let verifier = state.liveness.clone();
    let verdict = tokio::task::spawn_blocking(move || verifier.verify_liveness(&bearer))
        .await
        .unwrap_or_else(|e| Err(Indeterminate(anyhow::anyhow!("liveness task failed: {e}"))));

    liveness_response(verdict)
}

async fn clear_session(state: &AuthState, claims: Claims) -> Result<bool, AuthApiError> {
    let authenticator = state.authenticator.clone();
    blocking(move || {
        authenticator.sign_out(&claims).map_err(|e| {
            error!("Failed to clear session token: {:#}", e);
            AuthApiError::InternalError
        })
    })
    .await
}

/// Tab-close beacon - POST /api/auth/signout-beacon
/// Succeeds whether or not a session existed.
pub async fn signout_beacon(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let claims = bearer_from_headers(&headers).and_then(|b| state.jwt_handler.verify(&b).ok());
    let Some(claims) = claims else {
        return Json(json!({ "success": true })).into_response();
    };

    match clear_session(&state, claims).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false })),
        )
            .into_response(),
    }
}

/// Explicit sign-out - POST /api/auth/signout
pub async fn sign_out(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AuthApiError> {
    clear_session(&state, claims).await?;

    Ok((
        [(header::SET_COOKIE, state.cookies.cleared_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// Re-sign the current bearer - POST /api/auth/refresh
/// No store access: the session token is carried over, so liveness is unchanged.
pub async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, AuthApiError> {
    let bearer = bearer_from_headers(&headers).ok_or(AuthApiError::Unauthorized)?;
    let refreshed = state
        .jwt_handler
        .reissue(&bearer)
        .map_err(|_| AuthApiError::Unauthorized)?;

    let cookie = state.cookies.session_cookie(&refreshed);
    let body = RefreshResponse {
        expires_in: refreshed.expires_in(),
        expires_at: refreshed.claims.exp,
        token: refreshed.token,
    };

    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Get current identity - GET /api/auth/me
/// Built from the bearer claims, no store lookup.
pub async fn get_current_user(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse::from(&claims))
}

/// Change own password - POST /api/user/change-password
/// Existing sessions are left alone; the stored session token is not rotated.
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    if payload.current_password.is_empty() || payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword);
    }

    let store = state.store.clone();
    blocking(move || {
        let account = store
            .find_by_id(&claims.sub)
            .map_err(internal)?
            .ok_or(AuthApiError::AccountNotFound)?;

        let matches = bcrypt::verify(&payload.current_password, &account.password_hash)
            .map_err(|e| internal(e.into()))?;
        if !matches {
            warn!(account = %account.id, "Password change refused: wrong current password");
            return Err(AuthApiError::WrongCurrentPassword);
        }

        store
            .update_account(
                &account.id,
                &AccountUpdate {
                    password: Some(payload.new_password),
                    ..Default::default()
                },
            )
            .map_err(internal)?
            .ok_or(AuthApiError::AccountNotFound)?;

        info!(account = %account.id, "🔑 Password changed");
        Ok(())
    })
    .await?;

    Ok(Json(json!({ "message": "Password changed." })))
}

pub(crate) fn internal(e: anyhow::Error) -> AuthApiError {
    error!("Auth API internal error: {:#}", e);
    AuthApiError::InternalError
}

/// Auth API errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthApiError {
    MissingCredentials,
    InvalidCredentials,
    AccountBlocked,
    MaintenanceMode(String),
    Unauthorized,
    WeakPassword,
    WrongCurrentPassword,
    InvalidRequest(&'static str),
    InvalidAccountId,
    AccountNotFound,
    EmailTaken,
    CannotDeleteSelf,
    InternalError,
}

impl From<AuthError> for AuthApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => AuthApiError::MissingCredentials,
            AuthError::InvalidCredentials => AuthApiError::InvalidCredentials,
            AuthError::AccountBlocked => AuthApiError::AccountBlocked,
            AuthError::MaintenanceMode(message) => AuthApiError::MaintenanceMode(message),
            AuthError::Internal(e) => internal(e),
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthApiError::MissingCredentials => (
                StatusCode::BAD_REQUEST,
                "missing_credentials",
                AuthError::MissingCredentials.to_string(),
            ),
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                AuthError::InvalidCredentials.to_string(),
            ),
            AuthApiError::AccountBlocked => (
                StatusCode::FORBIDDEN,
                "account_blocked",
                AuthError::AccountBlocked.to_string(),
            ),
            AuthApiError::MaintenanceMode(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, "maintenance_mode", message)
            }
            AuthApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required".to_string(),
            ),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "weak_password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            ),
            AuthApiError::WrongCurrentPassword => (
                StatusCode::FORBIDDEN,
                "wrong_current_password",
                "The current password is incorrect".to_string(),
            ),
            AuthApiError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message.to_string())
            }
            AuthApiError::InvalidAccountId => (
                StatusCode::BAD_REQUEST,
                "invalid_account_id",
                "Invalid account ID format".to_string(),
            ),
            AuthApiError::AccountNotFound => (
                StatusCode::NOT_FOUND,
                "account_not_found",
                "Account not found".to_string(),
            ),
            AuthApiError::EmailTaken => (
                StatusCode::CONFLICT,
                "email_taken",
                "This email is already in use".to_string(),
            ),
            AuthApiError::CannotDeleteSelf => (
                StatusCode::BAD_REQUEST,
                "cannot_delete_self",
                "Cannot delete your own account".to_string(),
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
