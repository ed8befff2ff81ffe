//! Administration Endpoints
//! Mission: Account management and the maintenance switch (admin only)

use crate::auth::{
    api::{blocking, internal, AuthApiError, AuthState},
    middleware::{require_admin, AuthError},
    models::{
        AccountResponse, AccountUpdate, Claims, EmailTaken, MaintenanceSettings, NewAccount,
        MIN_PASSWORD_LEN,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;

/// Errors from admin handlers: either the caller lacks the role or the operation failed
pub enum AdminError {
    Auth(AuthError),
    Api(AuthApiError),
}

impl From<AuthError> for AdminError {
    fn from(err: AuthError) -> Self {
        AdminError::Auth(err)
    }
}

impl From<AuthApiError> for AdminError {
    fn from(err: AuthApiError) -> Self {
        AdminError::Api(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::Auth(e) => e.into_response(),
            AdminError::Api(e) => e.into_response(),
        }
    }
}

fn store_error(e: anyhow::Error) -> AuthApiError {
    if e.is::<EmailTaken>() {
        AuthApiError::EmailTaken
    } else {
        internal(e)
    }
}

fn parse_account_id(raw: &str) -> Result<Uuid, AuthApiError> {
    Uuid::parse_str(raw).map_err(|_| AuthApiError::InvalidAccountId)
}

/// List accounts - GET /api/admin/accounts
pub async fn list_accounts(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<AccountResponse>>, AdminError> {
    require_admin(&claims)?;

    let store = state.store.clone();
    let accounts = blocking(move || store.list_accounts().map_err(internal)).await?;

    Ok(Json(
        accounts.iter().map(AccountResponse::from_account).collect(),
    ))
}

/// Create account - POST /api/admin/accounts
pub async fn create_account(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewAccount>,
) -> Result<(StatusCode, Json<AccountResponse>), AdminError> {
    require_admin(&claims)?;

    if payload.email.trim().is_empty() || payload.vendor_scope.trim().is_empty() {
        return Err(AuthApiError::InvalidRequest("Email and vendor scope are required").into());
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword.into());
    }

    let store = state.store.clone();
    let account = blocking(move || store.create_account(&payload).map_err(store_error)).await?;

    info!(admin = %claims.sub, "✅ Account created: {}", account.email);
    Ok((StatusCode::CREATED, Json(AccountResponse::from_account(&account))))
}

/// Update account - PUT /api/admin/accounts/:id
/// Blocking an account or changing its role does not end a live session.
pub async fn update_account(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
    Json(payload): Json<AccountUpdate>,
) -> Result<Json<AccountResponse>, AdminError> {
    require_admin(&claims)?;
    let id = parse_account_id(&account_id)?;

    let blank = |field: &Option<String>| matches!(field, Some(v) if v.trim().is_empty());
    if blank(&payload.email) || blank(&payload.vendor_scope) {
        return Err(AuthApiError::InvalidRequest("Email and vendor scope cannot be blank").into());
    }
    if matches!(&payload.password, Some(p) if p.len() < MIN_PASSWORD_LEN) {
        return Err(AuthApiError::WeakPassword.into());
    }

    let store = state.store.clone();
    let account = blocking(move || {
        store
            .update_account(&id, &payload)
            .map_err(store_error)?
            .ok_or(AuthApiError::AccountNotFound)
    })
    .await?;

    info!(admin = %claims.sub, "Account updated: {}", account.id);
    Ok(Json(AccountResponse::from_account(&account)))
}

/// Delete account - DELETE /api/admin/accounts/:id
pub async fn delete_account(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
) -> Result<StatusCode, AdminError> {
    require_admin(&claims)?;
    let id = parse_account_id(&account_id)?;

    if id == claims.sub {
        return Err(AuthApiError::CannotDeleteSelf.into());
    }

    let store = state.store.clone();
    let deleted = blocking(move || store.delete_account(&id).map_err(internal)).await?;
    if !deleted {
        return Err(AuthApiError::AccountNotFound.into());
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Read maintenance settings - GET /api/settings/maintenance
pub async fn get_maintenance(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MaintenanceSettings>, AdminError> {
    require_admin(&claims)?;

    let store = state.store.clone();
    let settings = blocking(move || store.maintenance().map_err(internal)).await?;
    Ok(Json(settings))
}

/// Update maintenance settings - POST /api/settings/maintenance
/// Only gates future logins; sessions already issued keep working.
pub async fn set_maintenance(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<MaintenanceSettings>,
) -> Result<Json<MaintenanceSettings>, AdminError> {
    require_admin(&claims)?;

    let store = state.store.clone();
    let settings = blocking(move || {
        store.set_maintenance(&payload).map_err(internal)?;
        Ok(payload)
    })
    .await?;

    info!(admin = %claims.sub, enabled = settings.maintenance_mode, "Maintenance settings updated");
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let taken = store_error(EmailTaken("ana@example.com".to_string()).into());
        assert_eq!(taken, AuthApiError::EmailTaken);

        let other = store_error(anyhow::anyhow!("disk full"));
        assert_eq!(other, AuthApiError::InternalError);
    }

    #[test]
    fn test_parse_account_id() {
        assert!(parse_account_id(&Uuid::new_v4().to_string()).is_ok());
        assert_eq!(
            parse_account_id("42").unwrap_err(),
            AuthApiError::InvalidAccountId
        );
    }
}
