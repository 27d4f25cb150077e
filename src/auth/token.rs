//! Signed access tokens
//!
//! Tokens are HS256 JSON Web Tokens carrying the username as subject plus
//! issue and expiry times. The signing secret is injected at construction and
//! can be replaced at runtime with [`TokenIssuer::rotate`]; tokens signed with
//! the previous secret stop verifying immediately.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("failed to encode token: {message}")]
    Encoding { message: String },
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            JwtErrorKind::ExpiredSignature => TokenError::Expired,
            JwtErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Claims {
    /// Subject: the username the token was issued to
    sub: String,
    /// Issued at, seconds since the Unix epoch
    iat: u64,
    /// Expires at, seconds since the Unix epoch
    exp: u64,
}

/// Issues and verifies access tokens
#[derive(Debug)]
pub struct TokenIssuer {
    secret: RwLock<Vec<u8>>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: RwLock::new(secret.into()),
            ttl,
        }
    }

    /// Replace the signing secret
    pub fn rotate(&self, secret: impl Into<Vec<u8>>) {
        let mut current = self.secret.write().unwrap_or_else(PoisonError::into_inner);
        *current = secret.into();
        tracing::info!("token signing secret rotated");
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `username`, valid for the configured TTL
    pub fn issue(&self, username: &str) -> Result<String, TokenError> {
        self.issue_at(username, unix_now())
    }

    /// Verify a token and return the principal it was issued to
    ///
    /// Expiry is checked against the current time with no leeway.
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let secret = self.secret.read().unwrap_or_else(PoisonError::into_inner);
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&secret), &validation)?;
        Ok(Principal::new(data.claims.sub))
    }

    fn issue_at(&self, username: &str, now: u64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };

        let secret = self.secret.read().unwrap_or_else(PoisonError::into_inner);
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&secret)).map_err(|e| {
            TokenError::Encoding {
                message: e.to_string(),
            }
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
