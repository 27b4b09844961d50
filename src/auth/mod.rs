//! Password hashing for user accounts.
//!
//! Hashes are Argon2id PHC strings (`$argon2id$v=19$...`) carrying their own
//! salt and parameters, so verification needs only the stored string.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    #[error("stored password hash is malformed: {0}")]
    InvalidHash(String),
}

/// Hashes a plaintext password with a fresh random salt.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;
    Ok(hash.to_string())
}

/// Returns `Ok(false)` for a wrong password; `Err` only when the stored hash
/// cannot be parsed.
pub fn verify_password(plaintext: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::HashingFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("pa55word").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("pa55word", &hash).unwrap());
        assert!(!verify_password("pa55wort", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("pa55word").unwrap();
        let b = hash_password("pa55word").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let err = verify_password("pa55word", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, PasswordError::InvalidHash(_)));
    }
}
