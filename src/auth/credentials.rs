//! Credential hashing
//!
//! Passwords are never stored; the store keeps a salted bcrypt hash. The
//! salt is embedded in the hash, so verifying only needs the stored string.

use thiserror::Error;

/// Lowest work factor bcrypt accepts
pub const MIN_CREDENTIAL_COST: u32 = 4;

/// Highest work factor bcrypt accepts
pub const MAX_CREDENTIAL_COST: u32 = 31;

#[derive(Debug, Error)]
#[error("credential hashing failed: {0}")]
pub struct CredentialError(#[from] bcrypt::BcryptError);

/// Hash `password` with a fresh salt at work factor `cost`
pub fn hash_credential(password: &str, cost: u32) -> Result<String, CredentialError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Check `password` against a hash produced by [`hash_credential`]
///
/// A stored value that is not a bcrypt hash is an error, not a mismatch.
pub fn verify_credential(password: &str, stored: &str) -> Result<bool, CredentialError> {
    Ok(bcrypt::verify(password, stored)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_same_password_only() {
        let stored = hash_credential("secret", MIN_CREDENTIAL_COST).unwrap();
        assert!(verify_credential("secret", &stored).unwrap());
        assert!(!verify_credential("Secret", &stored).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_credential("secret", MIN_CREDENTIAL_COST).unwrap();
        let second = hash_credential("secret", MIN_CREDENTIAL_COST).unwrap();

        assert_ne!(first, second);
        assert!(verify_credential("secret", &second).unwrap());
    }

    #[test]
    fn test_hash_does_not_contain_password() {
        let stored = hash_credential("hunter2", MIN_CREDENTIAL_COST).unwrap();
        assert!(stored.starts_with("$2"));
        assert!(!stored.contains("hunter2"));
    }

    #[test]
    fn test_cost_out_of_range_is_rejected() {
        assert!(hash_credential("secret", MIN_CREDENTIAL_COST - 1).is_err());
        assert!(hash_credential("secret", MAX_CREDENTIAL_COST + 1).is_err());
    }

    #[test]
    fn test_garbage_stored_value_is_an_error() {
        assert!(verify_credential("secret", "not-a-hash").is_err());
    }
}
