//! Server configuration
//! Mission: One place for every knob, from flags, the environment or a .env file

use anyhow::{bail, Result};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::middleware::RateLimitConfig;

/// Signing secret used when `JWT_SECRET` is unset. Local development only.
pub const DEV_JWT_SECRET: &str = "session-guard-dev-secret-change-me";

/// Longest bearer lifetime accepted (one day)
pub const MAX_SESSION_TTL_SECS: u64 = 86_400;

#[derive(Parser, Debug, Clone)]
#[command(name = "session-guard")]
#[command(about = "Single-session authentication service with server-side liveness checks")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// SQLite database holding accounts and the maintenance record
    #[arg(long, env = "AUTH_DB_PATH", default_value = "session_guard.db")]
    pub db_path: PathBuf,

    /// HS256 signing secret for bearers
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Bearer lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 1800)]
    pub session_ttl_secs: u64,

    /// bcrypt work factor for stored passwords
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Mark the session cookie Secure (enable behind TLS)
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false, action = clap::ArgAction::Set)]
    pub secure_cookies: bool,

    /// Login attempts allowed per client IP per minute
    #[arg(long, env = "LOGIN_RATE_LIMIT_PER_MINUTE", default_value_t = 20)]
    pub login_rate_limit_per_minute: u32,

    /// Admin account created on startup when missing
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
    pub bootstrap_admin_email: Option<String>,

    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            bail!("SESSION_TTL_SECS must be greater than zero");
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            bail!(
                "SESSION_TTL_SECS must be at most {}, got {}",
                MAX_SESSION_TTL_SECS,
                self.session_ttl_secs
            );
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {}", self.bcrypt_cost);
        }
        if self.login_rate_limit_per_minute == 0 {
            bail!("LOGIN_RATE_LIMIT_PER_MINUTE must be greater than zero");
        }
        if self.bootstrap_admin_email.is_some() != self.bootstrap_admin_password.is_some() {
            bail!("BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together");
        }
        if matches!(&self.jwt_secret, Some(s) if s.trim().is_empty()) {
            bail!("JWT_SECRET is set but empty");
        }
        Ok(())
    }

    /// The configured secret, or the development fallback. The flag is true
    /// when the fallback is in use.
    pub fn signing_secret(&self) -> (String, bool) {
        match &self.jwt_secret {
            Some(secret) => (secret.clone(), false),
            None => (DEV_JWT_SECRET.to_string(), true),
        }
    }

    /// Bearer lifetime, clamped to `MAX_SESSION_TTL_SECS` for unvalidated configs
    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = self.session_ttl_secs.min(MAX_SESSION_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn login_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.login_rate_limit_per_minute,
            window: Duration::from_secs(60),
            burst: (self.login_rate_limit_per_minute / 4).max(1),
        }
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// Load `.env` from the working directory (and parents), then from the crate root.
pub fn load_env() {
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["session-guard"];
        argv.extend_from_slice(args);
        ServerConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_parse() {
        let config = parse(&[
            "--bind-addr",
            "127.0.0.1:8080",
            "--jwt-secret",
            "s3cret",
            "--session-ttl-secs",
            "600",
            "--bcrypt-cost",
            "6",
            "--secure-cookies",
            "true",
            "--login-rate-limit-per-minute",
            "8",
        ]);

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(10));
        assert!(config.secure_cookies);
        assert_eq!(config.signing_secret(), ("s3cret".to_string(), false));
        assert_eq!(config.login_rate_limit().max_requests, 8);
        assert_eq!(config.login_rate_limit().burst, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = parse(&["--jwt-secret", "x", "--bcrypt-cost", "4"]);
        assert!(config.validate().is_ok());

        config.session_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.session_ttl_secs = MAX_SESSION_TTL_SECS + 1;
        assert!(config.validate().is_err());
        config.session_ttl_secs = MAX_SESSION_TTL_SECS;
        assert!(config.validate().is_ok());
        config.session_ttl_secs = 60;

        config.bcrypt_cost = 2;
        assert!(config.validate().is_err());
        config.bcrypt_cost = 4;

        config.bootstrap_admin_email = Some("root@example.com".to_string());
        config.bootstrap_admin_password = None;
        assert!(config.validate().is_err());

        config.bootstrap_admin_password = Some("changeme".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.bootstrap_admin(),
            Some(("root@example.com", "changeme"))
        );
    }

    #[test]
    fn test_huge_ttl_never_goes_negative() {
        let config = parse(&[
            "--jwt-secret",
            "x",
            "--session-ttl-secs",
            "18446744073709551615",
        ]);
        assert!(config.validate().is_err());
        assert_eq!(
            config.session_ttl(),
            chrono::Duration::seconds(MAX_SESSION_TTL_SECS as i64)
        );
    }

    #[test]
    fn test_dev_secret_fallback() {
        let mut config = parse(&[]);
        config.jwt_secret = None;
        let (secret, fallback) = config.signing_secret();
        assert_eq!(secret, DEV_JWT_SECRET);
        assert!(fallback);
    }
}
