//! Authenticator
//! Mission: Turn credentials into a signed bearer and make it the account's only live session

use crate::auth::{
    account_store::CredentialStore,
    jwt::{JwtHandler, SignedBearer},
    models::{Account, AccountStatus, Claims, Role},
};
use anyhow::Context;
use bcrypt::verify;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Opaque session token length in bytes before hex encoding
const SESSION_TOKEN_BYTES: usize = 32;

/// Login failures. Unknown email and wrong password share one variant so callers
/// cannot tell which accounts exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password are required.")]
    MissingCredentials,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("This account is blocked. Contact the administrator.")]
    AccountBlocked,
    #[error("{0}")]
    MaintenanceMode(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct Session {
    pub bearer: SignedBearer,
    pub account: Account,
}

/// Mint a new unguessable session token
pub fn mint_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    jwt: Arc<JwtHandler>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: Arc<JwtHandler>) -> Self {
        Self { store, jwt }
    }

    /// Check credentials and issue a bearer. On success the stored session token is
    /// overwritten, which retires every bearer issued before this one.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let Some(account) = self.store.find_by_email(email)? else {
            warn!("❌ Login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if account.status == AccountStatus::Blocked {
            warn!(account = %account.id, "❌ Login refused: account blocked");
            return Err(AuthError::AccountBlocked);
        }

        let maintenance = self.store.maintenance()?;
        if maintenance.maintenance_mode && account.role != Role::Admin {
            info!(account = %account.id, "🚧 Login refused: maintenance mode");
            return Err(AuthError::MaintenanceMode(maintenance.message()));
        }

        let password_ok =
            verify(password, &account.password_hash).context("Failed to verify password")?;
        if !password_ok {
            warn!(account = %account.id, "❌ Login refused: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let session_token = mint_session_token();
        let bearer = self.jwt.issue(&account, &session_token)?;

        // The only write that makes a session current
        self.store.store_session_token(&account.id, &session_token)?;

        info!(
            "✅ Login successful: {} ({})",
            account.email,
            account.role.as_str()
        );

        Ok(Session {
            bearer,
            account: Account {
                session_token: Some(session_token),
                ..account
            },
        })
    }

    /// Clear the stored token if it still belongs to this bearer. A no-op when the
    /// session was already cleared or superseded by a newer login.
    pub fn sign_out(&self, claims: &Claims) -> anyhow::Result<bool> {
        let cleared = self.store.clear_session_token(&claims.sub, &claims.sid)?;
        if cleared {
            info!(account = %claims.sub, "👋 Session signed out");
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        account_store::SqliteAccountStore,
        clock::ManualClock,
        models::{MaintenanceSettings, NewAccount, SessionSlot},
    };
    use chrono::{Duration, Utc};
    use tempfile::NamedTempFile;

    struct Fixture {
        store: Arc<SqliteAccountStore>,
        auth: Authenticator,
        _db: NamedTempFile,
    }

    fn fixture() -> Fixture {
        let db = NamedTempFile::new().unwrap();
        let store = Arc::new(SqliteAccountStore::new(db.path().to_str().unwrap(), 4).unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let jwt = Arc::new(JwtHandler::new("test-secret", Duration::minutes(30), clock));
        let auth = Authenticator::new(store.clone(), jwt);
        Fixture {
            store,
            auth,
            _db: db,
        }
    }

    fn add_account(store: &SqliteAccountStore, email: &str, role: Role) -> Account {
        store
            .create_account(&NewAccount {
                email: email.to_string(),
                password: "secret1".to_string(),
                vendor_scope: "ANA".to_string(),
                role,
            })
            .unwrap()
    }

    #[test]
    fn test_minted_tokens_are_unique_and_long() {
        let a = mint_session_token();
        let b = mint_session_token();
        assert_eq!(a.len(), SESSION_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_successful_login_stores_token() {
        let f = fixture();
        let account = add_account(&f.store, "ana@example.com", Role::User);

        let session = f.auth.authenticate("ana@example.com", "secret1").unwrap();
        assert_eq!(session.account.id, account.id);
        assert_eq!(
            f.store.session_slot(&account.id).unwrap(),
            SessionSlot::Current(session.bearer.claims.sid.clone())
        );
    }

    #[test]
    fn test_unknown_email_and_wrong_password_look_the_same() {
        let f = fixture();
        add_account(&f.store, "ana@example.com", Role::User);

        let unknown = f.auth.authenticate("nobody@example.com", "secret1").unwrap_err();
        let wrong = f.auth.authenticate("ana@example.com", "nope").unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn test_missing_credentials() {
        let f = fixture();
        assert!(matches!(
            f.auth.authenticate("  ", "x"),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            f.auth.authenticate("ana@example.com", ""),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_blocked_account_refused() {
        let f = fixture();
        let account = add_account(&f.store, "ana@example.com", Role::User);
        f.store
            .update_account(
                &account.id,
                &crate::auth::models::AccountUpdate {
                    status: Some(AccountStatus::Blocked),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(matches!(
            f.auth.authenticate("ana@example.com", "secret1"),
            Err(AuthError::AccountBlocked)
        ));
        assert_eq!(f.store.session_slot(&account.id).unwrap(), SessionSlot::Empty);
    }

    #[test]
    fn test_maintenance_gate_spares_admins() {
        let f = fixture();
        add_account(&f.store, "ana@example.com", Role::User);
        add_account(&f.store, "root@example.com", Role::Admin);
        f.store
            .set_maintenance(&MaintenanceSettings {
                maintenance_mode: true,
                maintenance_message: Some("Back at 18h".to_string()),
            })
            .unwrap();

        match f.auth.authenticate("ana@example.com", "secret1") {
            Err(AuthError::MaintenanceMode(msg)) => assert_eq!(msg, "Back at 18h"),
            other => panic!("expected maintenance refusal, got {:?}", other.map(|_| ())),
        }
        assert!(f.auth.authenticate("root@example.com", "secret1").is_ok());
    }

    #[test]
    fn test_second_login_replaces_token() {
        let f = fixture();
        let account = add_account(&f.store, "ana@example.com", Role::User);

        let first = f.auth.authenticate("ana@example.com", "secret1").unwrap();
        let second = f.auth.authenticate("ana@example.com", "secret1").unwrap();
        assert_ne!(first.bearer.claims.sid, second.bearer.claims.sid);
        assert_eq!(
            f.store.session_slot(&account.id).unwrap(),
            SessionSlot::Current(second.bearer.claims.sid.clone())
        );

        // Signing out the stale session leaves the newer one alone
        assert!(!f.auth.sign_out(&first.bearer.claims).unwrap());
        assert!(f.auth.sign_out(&second.bearer.claims).unwrap());
        assert!(!f.auth.sign_out(&second.bearer.claims).unwrap());
        assert_eq!(f.store.session_slot(&account.id).unwrap(), SessionSlot::Empty);
    }
}
