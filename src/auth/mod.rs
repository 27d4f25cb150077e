//! Authentication collaborators
//!
//! The ledger does not own credential storage formats or token wire formats;
//! it only needs to turn a login into a [`Principal`] and a token, and a
//! token back into a [`Principal`]. This module provides a small concrete
//! implementation of both:
//!
//! - [`credentials`] - bcrypt hashes stored with each user
//! - [`token`] - HS256 JSON Web Tokens with an expiry

pub mod credentials;
pub mod token;

pub use credentials::{
    hash_credential, verify_credential, CredentialError, MAX_CREDENTIAL_COST, MIN_CREDENTIAL_COST,
};
pub use token::{TokenError, TokenIssuer};

/// Authenticated identity
///
/// Produced only by a successful login or by verifying a token, then carried
/// explicitly through every ledger call that acts on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}
