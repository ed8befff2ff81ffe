//! Account Storage
//! Mission: Persist accounts, the current session token and the maintenance flag in SQLite
//!
//! The `session_token` column is the single authority on which bearer is live.
//! Logins overwrite it with a plain single-row UPDATE (last write wins) and
//! sign-outs clear it only while it still holds the caller's token.

use crate::auth::models::{
    normalize_email, Account, AccountStatus, AccountUpdate, EmailTaken, MaintenanceSettings,
    NewAccount, Role, SessionSlot,
};
use anyhow::{Context, Result};
use bcrypt::hash;
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Persistent account store. Every method is a single round trip.
pub trait CredentialStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>>;

    /// Read only the session token column for an account
    fn session_slot(&self, id: &Uuid) -> Result<SessionSlot>;

    /// Unconditionally overwrite the stored session token
    fn store_session_token(&self, id: &Uuid, token: &str) -> Result<()>;

    /// Clear the stored token if it still equals `expected`. Returns whether a row changed.
    fn clear_session_token(&self, id: &Uuid, expected: &str) -> Result<bool>;

    fn maintenance(&self) -> Result<MaintenanceSettings>;

    fn set_maintenance(&self, settings: &MaintenanceSettings) -> Result<()>;

    fn create_account(&self, new: &NewAccount) -> Result<Account>;

    /// Apply a partial update. Never touches the session token.
    fn update_account(&self, id: &Uuid, update: &AccountUpdate) -> Result<Option<Account>>;

    fn delete_account(&self, id: &Uuid) -> Result<bool>;

    fn list_accounts(&self) -> Result<Vec<Account>>;
}

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, role, status, vendor_scope, session_token, created_at";

#[derive(Debug, Error)]
#[error("unrecognized {column} value {value:?}")]
struct BadColumn {
    column: &'static str,
    value: String,
}

fn bad_column(idx: usize, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(BadColumn { column, value }))
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let id: String = row.get(0)?;
    let role: String = row.get(3)?;
    let status: String = row.get(4)?;

    Ok(Account {
        id: Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::parse(&role).ok_or_else(|| bad_column(3, "role", role.clone()))?,
        status: AccountStatus::parse(&status)
            .ok_or_else(|| bad_column(4, "status", status.clone()))?,
        vendor_scope: row.get(5)?,
        session_token: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Account storage with SQLite backend
pub struct SqliteAccountStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl SqliteAccountStore {
    /// Create a new account store and initialize the database
    pub fn new(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open account database at {}", self.db_path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL,
                vendor_scope TEXT NOT NULL,
                session_token TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Single-row settings table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS app_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                maintenance_mode INTEGER NOT NULL DEFAULT 0,
                maintenance_message TEXT
            )",
            [],
        )?;
        conn.execute("INSERT OR IGNORE INTO app_config (id) VALUES (1)", [])?;

        Ok(())
    }

    /// Create the first administrator if the store has none
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM accounts WHERE role = 'ADMIN'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin accounts")?;

        if count > 0 {
            return Ok(false);
        }

        let admin = self.create_account(&NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            vendor_scope: "ADMIN".to_string(),
            role: Role::Admin,
        })?;
        info!("🔐 Bootstrap admin account created: {}", admin.email);
        Ok(true)
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.bcrypt_cost).context("Failed to hash password")
    }
}

impl CredentialStore for SqliteAccountStore {
    fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1");

        conn.query_row(&sql, params![normalize_email(email)], row_to_account)
            .optional()
            .context("Failed to look up account by email")
    }

    fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");

        conn.query_row(&sql, params![id.to_string()], row_to_account)
            .optional()
            .context("Failed to look up account by id")
    }

    fn session_slot(&self, id: &Uuid) -> Result<SessionSlot> {
        let conn = self.connect()?;

        let token: Option<Option<String>> = conn
            .query_row(
                "SELECT session_token FROM accounts WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read session token")?;

        Ok(match token {
            None => SessionSlot::Missing,
            Some(None) => SessionSlot::Empty,
            Some(Some(t)) => SessionSlot::Current(t),
        })
    }

    fn store_session_token(&self, id: &Uuid, token: &str) -> Result<()> {
        let conn = self.connect()?;

        let rows = conn
            .execute(
                "UPDATE accounts SET session_token = ?2 WHERE id = ?1",
                params![id.to_string(), token],
            )
            .context("Failed to store session token")?;

        if rows == 0 {
            anyhow::bail!("Account {} not found", id);
        }

        debug!(account = %id, "Session token rotated");
        Ok(())
    }

    fn clear_session_token(&self, id: &Uuid, expected: &str) -> Result<bool> {
        let conn = self.connect()?;

        let rows = conn
            .execute(
                "UPDATE accounts SET session_token = NULL
                 WHERE id = ?1 AND session_token = ?2",
                params![id.to_string(), expected],
            )
            .context("Failed to clear session token")?;

        Ok(rows > 0)
    }

    fn maintenance(&self) -> Result<MaintenanceSettings> {
        let conn = self.connect()?;

        let settings = conn
            .query_row(
                "SELECT maintenance_mode, maintenance_message FROM app_config WHERE id = 1",
                [],
                |row| {
                    Ok(MaintenanceSettings {
                        maintenance_mode: row.get::<_, i64>(0)? != 0,
                        maintenance_message: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to read maintenance settings")?;

        Ok(settings.unwrap_or_default())
    }

    fn set_maintenance(&self, settings: &MaintenanceSettings) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "INSERT INTO app_config (id, maintenance_mode, maintenance_message)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                maintenance_mode = excluded.maintenance_mode,
                maintenance_message = excluded.maintenance_message",
            params![settings.maintenance_mode as i64, settings.maintenance_message],
        )
        .context("Failed to update maintenance settings")?;

        if settings.maintenance_mode {
            warn!("🚧 Maintenance mode enabled");
        } else {
            info!("Maintenance mode disabled");
        }
        Ok(())
    }

    fn create_account(&self, new: &NewAccount) -> Result<Account> {
        let account = Account {
            id: Uuid::new_v4(),
            email: normalize_email(&new.email),
            password_hash: self.hash_password(&new.password)?,
            role: new.role,
            status: AccountStatus::Active,
            vendor_scope: new.vendor_scope.trim().to_string(),
            session_token: None,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO accounts (id, email, password_hash, role, status, vendor_scope, session_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
            params![
                account.id.to_string(),
                account.email,
                account.password_hash,
                account.role.as_str(),
                account.status.as_str(),
                account.vendor_scope,
                account.created_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(EmailTaken(account.email).into()),
            Err(e) => return Err(e).context("Failed to insert account"),
        }

        info!(
            "✅ Created account: {} ({})",
            account.email,
            account.role.as_str()
        );

        Ok(account)
    }

    fn update_account(&self, id: &Uuid, update: &AccountUpdate) -> Result<Option<Account>> {
        let Some(mut account) = self.find_by_id(id)? else {
            return Ok(None);
        };

        if let Some(email) = &update.email {
            account.email = normalize_email(email);
        }
        if let Some(password) = &update.password {
            account.password_hash = self.hash_password(password)?;
        }
        if let Some(vendor) = &update.vendor_scope {
            account.vendor_scope = vendor.trim().to_string();
        }
        if let Some(role) = update.role {
            account.role = role;
        }
        if let Some(status) = update.status {
            account.status = status;
        }

        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE accounts
             SET email = ?2, password_hash = ?3, role = ?4, status = ?5, vendor_scope = ?6
             WHERE id = ?1",
            params![
                id.to_string(),
                account.email,
                account.password_hash,
                account.role.as_str(),
                account.status.as_str(),
                account.vendor_scope,
            ],
        );

        match updated {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(account)),
            Err(e) if is_unique_violation(&e) => Err(EmailTaken(account.email).into()),
            Err(e) => Err(e).context("Failed to update account"),
        }
    }

    fn delete_account(&self, id: &Uuid) -> Result<bool> {
        let conn = self.connect()?;

        let rows = conn
            .execute("DELETE FROM accounts WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete account")?;

        if rows > 0 {
            info!("🗑️  Deleted account: {}", id);
        }
        Ok(rows > 0)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY email ASC");

        let mut stmt = conn.prepare(&sql)?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list accounts")?;

        Ok(accounts)
    }
}
