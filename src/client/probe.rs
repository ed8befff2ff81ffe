//! Session API Client
//!
//! Talks to the session-guard HTTP endpoints on behalf of one device. The
//! monitor only needs the `SessionProbe` seam; login, refresh and sign-out are
//! here for callers that drive the whole flow.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::auth::{
    liveness::{Indeterminate, Liveness, StaleReason, Verdict},
    models::{LivenessResponse, LoginResponse, RefreshResponse},
};

/// What the monitor needs from the server
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Ask the server whether the held bearer is still the current session
    async fn verify(&self) -> Verdict;

    /// Ask the server to drop the held session. Best effort.
    async fn signout_beacon(&self) -> Result<()>;
}

/// Login failures as reported by the server
#[derive(Debug, Error)]
pub enum LoginRejection {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is blocked")]
    AccountBlocked,
    #[error("maintenance: {0}")]
    Maintenance(String),
    #[error("too many login attempts")]
    RateLimited,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

fn rejection_from(status: StatusCode, body: Option<ErrorBody>) -> LoginRejection {
    match body {
        Some(b) => match b.error.as_str() {
            "missing_credentials" => LoginRejection::MissingCredentials,
            "invalid_credentials" => LoginRejection::InvalidCredentials,
            "account_blocked" => LoginRejection::AccountBlocked,
            "maintenance_mode" => LoginRejection::Maintenance(b.message),
            "rate_limit_exceeded" => LoginRejection::RateLimited,
            other => LoginRejection::Transport(anyhow!("login failed ({status}): {other}")),
        },
        None if status == StatusCode::TOO_MANY_REQUESTS => LoginRejection::RateLimited,
        None => LoginRejection::Transport(anyhow!("login failed with status {status}")),
    }
}

/// Map a liveness endpoint reply onto a verdict. Only 200 and 401 are determinate.
fn verdict_from(status: StatusCode, body: Option<LivenessResponse>) -> Verdict {
    match (status, body) {
        (StatusCode::OK, Some(LivenessResponse { valid: true, .. })) => Ok(Liveness::Valid),
        (StatusCode::OK, Some(LivenessResponse { valid: false, reason })) => Ok(Liveness::Invalid(
            reason.unwrap_or(StaleReason::Malformed),
        )),
        (StatusCode::UNAUTHORIZED, _) => Ok(Liveness::Invalid(StaleReason::SignedOut)),
        (status, _) => Err(Indeterminate(anyhow!(
            "verify-session answered {status}"
        ))),
    }
}

/// HTTP client for one device's session
pub struct HttpSessionClient {
    client: Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
}

impl HttpSessionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HttpSessionClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer: RwLock::new(None),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer.read().clone()
    }

    /// Resume a session persisted by an earlier run
    pub fn restore_bearer(&self, bearer: impl Into<String>) {
        *self.bearer.write() = Some(bearer.into());
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, LoginRejection> {
        let resp = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("POST /api/auth/login failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<ErrorBody>().await.ok();
            return Err(rejection_from(status, body));
        }

        let login = resp
            .json::<LoginResponse>()
            .await
            .context("Failed to parse login response")?;
        *self.bearer.write() = Some(login.token.clone());
        debug!(account = %login.account.id, "Signed in");
        Ok(login)
    }

    /// Re-sign the held bearer. Returns the new expiry.
    pub async fn refresh(&self) -> Result<RefreshResponse> {
        let bearer = self.bearer().context("No bearer held")?;
        let resp = self
            .client
            .post(self.url("/api/auth/refresh"))
            .bearer_auth(bearer)
            .send()
            .await
            .context("POST /api/auth/refresh failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("POST /api/auth/refresh {}: {}", status, text));
        }

        let refreshed = resp
            .json::<RefreshResponse>()
            .await
            .context("Failed to parse refresh response")?;
        *self.bearer.write() = Some(refreshed.token.clone());
        Ok(refreshed)
    }

    /// Explicit sign-out. The local bearer is dropped whatever the server says.
    pub async fn sign_out(&self) -> Result<()> {
        let held = self.bearer.write().take();
        let Some(bearer) = held else {
            return Ok(());
        };
        let resp = self
            .client
            .post(self.url("/api/auth/signout"))
            .bearer_auth(bearer)
            .send()
            .await
            .context("POST /api/auth/signout failed")?;

        if !resp.status().is_success() && resp.status() != StatusCode::UNAUTHORIZED {
            return Err(anyhow!("POST /api/auth/signout {}", resp.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProbe for HttpSessionClient {
    async fn verify(&self) -> Verdict {
        let Some(bearer) = self.bearer() else {
            return Ok(Liveness::Invalid(StaleReason::SignedOut));
        };

        let resp = self
            .client
            .post(self.url("/api/auth/verify-session"))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| Indeterminate(anyhow!(e).context("POST /api/auth/verify-session failed")))?;

        let status = resp.status();
        let body = if status == StatusCode::OK {
            Some(
                resp.json::<LivenessResponse>()
                    .await
                    .map_err(|e| Indeterminate(anyhow!(e).context("unreadable liveness body")))?,
            )
        } else {
            None
        };

        verdict_from(status, body)
    }

    async fn signout_beacon(&self) -> Result<()> {
        let Some(bearer) = self.bearer() else {
            return Ok(());
        };
        self.client
            .post(self.url("/api/auth/signout-beacon"))
            .bearer_auth(bearer)
            .send()
            .await
            .context("POST /api/auth/signout-beacon failed")?;
        Ok(())
    }
}
