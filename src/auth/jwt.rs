//! JWT Bearer Codec
//! Mission: Sign claims into tamper-evident bearers and verify them without touching the store

use crate::auth::{
    clock::Clock,
    models::{Account, Claims},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a bearer was rejected
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BearerError {
    #[error("bearer has expired")]
    Expired,
    #[error("bearer is malformed or has an invalid signature")]
    Malformed,
}

/// A freshly signed bearer and the claims inside it
#[derive(Debug, Clone)]
pub struct SignedBearer {
    pub token: String,
    pub claims: Claims,
}

impl SignedBearer {
    /// Seconds between issuance and expiry
    pub fn expires_in(&self) -> u64 {
        (self.claims.exp - self.claims.iat).max(0) as u64
    }
}

/// JWT Handler for bearer operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtHandler {
    /// Create a new handler. `ttl` is the fixed window from issuance to expiry.
    pub fn new(secret: &str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock below
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            clock,
        }
    }

    /// Build and sign claims for an account and a freshly minted session token
    pub fn issue(&self, account: &Account, session_token: &str) -> Result<SignedBearer> {
        let now = self.clock.now();
        let expiration = self.expiry_from(now).context("Invalid timestamp")?;

        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            vendor: account.vendor_scope.clone(),
            sid: session_token.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        debug!(
            "Issuing bearer for {} ({}), expires in {}s",
            account.email,
            account.id,
            self.ttl.num_seconds()
        );

        let token = self.sign(&claims)?;
        Ok(SignedBearer { token, claims })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .context("Failed to sign bearer")
    }

    /// Validate signature and structure, then expiry
    pub fn verify(&self, bearer: &str) -> Result<Claims, BearerError> {
        let decoded = decode::<Claims>(bearer, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Rejected bearer: {}", e);
                BearerError::Malformed
            })?;

        if decoded.claims.exp <= self.clock.now().timestamp() {
            return Err(BearerError::Expired);
        }

        Ok(decoded.claims)
    }

    /// Re-sign an unexpired bearer with a fresh window. The session token is carried over
    /// untouched, so liveness is unaffected.
    pub fn reissue(&self, bearer: &str) -> Result<SignedBearer, BearerError> {
        let mut claims = self.verify(bearer)?;
        let now = self.clock.now();
        let expiration = self.expiry_from(now).ok_or(BearerError::Malformed)?;

        claims.iat = now.timestamp();
        claims.exp = expiration.timestamp();

        let token = self.sign(&claims).map_err(|_| BearerError::Malformed)?;
        Ok(SignedBearer { token, claims })
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.ttl)
    }
}
