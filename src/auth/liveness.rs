//! Liveness Verifier
//! Mission: Decide whether a bearer is still the account's current session
//!
//! The verdict type keeps "could not check" apart from "checked and stale":
//! a store failure is an `Err(Indeterminate)` and never an `Invalid`.

use crate::auth::{
    account_store::CredentialStore,
    jwt::{BearerError, JwtHandler},
    models::{Claims, SessionSlot},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a bearer is no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    Expired,
    Malformed,
    AccountMissing,
    SignedOut,
    /// A newer login replaced this session
    Superseded,
}

impl From<BearerError> for StaleReason {
    fn from(err: BearerError) -> Self {
        match err {
            BearerError::Expired => StaleReason::Expired,
            BearerError::Malformed => StaleReason::Malformed,
        }
    }
}

/// Determinate outcome of a liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Valid,
    Invalid(StaleReason),
}

/// The check itself failed. Must never be treated as a logout signal.
#[derive(Debug, Error)]
#[error("session liveness is indeterminate: {0:#}")]
pub struct Indeterminate(pub anyhow::Error);

pub type Verdict = Result<Liveness, Indeterminate>;

/// Compare an already-decoded bearer against the stored session slot
pub fn compare(claims: &Claims, slot: &SessionSlot) -> Liveness {
    match slot {
        SessionSlot::Missing => Liveness::Invalid(StaleReason::AccountMissing),
        SessionSlot::Empty => Liveness::Invalid(StaleReason::SignedOut),
        SessionSlot::Current(current) if current.as_bytes() == claims.sid.as_bytes() => {
            Liveness::Valid
        }
        SessionSlot::Current(_) => Liveness::Invalid(StaleReason::Superseded),
    }
}

pub struct LivenessVerifier {
    store: Arc<dyn CredentialStore>,
    jwt: Arc<JwtHandler>,
}

impl LivenessVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: Arc<JwtHandler>) -> Self {
        Self { store, jwt }
    }

    /// Decode the bearer, then do one store read. Expired and malformed bearers never
    /// reach the store.
    pub fn verify_liveness(&self, bearer: &str) -> Verdict {
        let claims = match self.jwt.verify(bearer) {
            Ok(claims) => claims,
            Err(e) => return Ok(Liveness::Invalid(e.into())),
        };
        self.check_claims(&claims)
    }

    pub fn check_claims(&self, claims: &Claims) -> Verdict {
        let slot = self.store.session_slot(&claims.sub).map_err(|e| {
            warn!(account = %claims.sub, "⚠️ Liveness check could not read the store: {:#}", e);
            Indeterminate(e)
        })?;

        let liveness = compare(claims, &slot);
        debug!(account = %claims.sub, ?liveness, "Liveness checked");
        Ok(liveness)
    }
}
