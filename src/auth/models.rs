//! Authentication Models
//! Mission: Define accounts, bearer claims and the wire shapes of the auth API

use crate::auth::liveness::StaleReason;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Account record as persisted by the credential store
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: Role,
    pub status: AccountStatus,
    pub vendor_scope: String,
    #[serde(skip_serializing)]
    pub session_token: Option<String>, // latest issued opaque token, if any
    pub created_at: String,
}

/// Account roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin, // exempt from the maintenance gate
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Account status, checked at login time only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "BLOCKED")]
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(AccountStatus::Active),
            "BLOCKED" => Some(AccountStatus::Blocked),
            _ => None,
        }
    }
}

/// What the store knows about an account's current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSlot {
    /// No account with that id
    Missing,
    /// Account exists but nobody is signed in
    Empty,
    Current(String),
}

/// Bearer claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid, // account id
    pub email: String,
    pub role: Role,
    pub vendor: String,
    pub sid: String, // opaque session token copied at issuance
    pub iat: i64,
    pub exp: i64,
}

/// Global maintenance switch, read at login time
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceSettings {
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
}

pub const DEFAULT_MAINTENANCE_MESSAGE: &str =
    "The system is under maintenance. Please try again later.";

impl MaintenanceSettings {
    /// Message shown to users turned away at login
    pub fn message(&self) -> String {
        self.maintenance_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MAINTENANCE_MESSAGE)
            .to_string()
    }
}

/// Input for account creation
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub vendor_scope: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

/// Partial account update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub vendor_scope: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

/// Returned by the store when an email is already registered
#[derive(Debug, Error)]
#[error("email already registered: {0}")]
pub struct EmailTaken(pub String);

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64, // seconds until expiration
    pub expires_at: i64, // unix seconds
    pub account: AccountResponse,
}

/// Account response (sanitized)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub vendor_scope: String,
    pub created_at: String,
}

impl AccountResponse {
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
            status: account.status,
            vendor_scope: account.vendor_scope.clone(),
            created_at: account.created_at.clone(),
        }
    }
}

/// Identity view built from claims alone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub vendor: String,
    pub expires_at: i64,
}

impl From<&Claims> for MeResponse {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email.clone(),
            role: claims.role,
            vendor: claims.vendor.clone(),
            expires_at: claims.exp,
        }
    }
}

/// Liveness endpoint body for determinate outcomes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StaleReason>,
}

/// Body returned when a bearer is re-signed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
    pub expires_in: u64,
    pub expires_at: i64,
}

/// Change-password request body
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let admin = Role::Admin;
        let json = serde_json::to_string(&admin).unwrap();
        assert_eq!(json, r#""ADMIN""#);

        let user: Role = serde_json::from_str(r#""USER""#).unwrap();
        assert_eq!(user, Role::User);
    }

    #[test]
    fn test_role_and_status_string_conversion() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("viewer"), None);

        assert_eq!(AccountStatus::parse("blocked"), Some(AccountStatus::Blocked));
        assert_eq!(AccountStatus::Active.as_str(), "ACTIVE");
        assert_eq!(AccountStatus::parse("SUSPENDED"), None);
    }

    #[test]
    fn test_account_serialization_hides_secrets() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: Role::User,
            status: AccountStatus::Active,
            vendor_scope: "ANA".to_string(),
            session_token: Some("deadbeef".to_string()),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("deadbeef"));
    }

    #[test]
    fn test_maintenance_message_fallback() {
        let blank = MaintenanceSettings {
            maintenance_mode: true,
            maintenance_message: Some("   ".to_string()),
        };
        assert_eq!(blank.message(), DEFAULT_MAINTENANCE_MESSAGE);

        let custom = MaintenanceSettings {
            maintenance_mode: true,
            maintenance_message: Some("Back at 18h".to_string()),
        };
        assert_eq!(custom.message(), "Back at 18h");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
