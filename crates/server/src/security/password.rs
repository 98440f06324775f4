//! Argon2id password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use thiserror::Error;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Errors from password hashing and verification.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Password is shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    TooShort,

    /// Supplied password does not match the stored hash.
    #[error("invalid credentials")]
    Mismatch,

    /// Stored hash string cannot be parsed.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Hashing itself failed.
    #[error("password hashing failed")]
    Hashing,
}

/// Hash a password with Argon2id and a random salt.
///
/// # Errors
///
/// Returns `PasswordError::TooShort` for short passwords and
/// `PasswordError::Hashing` on internal failure.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::Hashing)?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// # Errors
///
/// Returns `PasswordError::Mismatch` when the password is wrong and
/// `PasswordError::InvalidHash` when the stored hash is unparseable.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(PasswordError::Mismatch),
        Err(_) => Err(PasswordError::InvalidHash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("parola-sigura-123").expect("hash");
        assert!(verify_password("parola-sigura-123", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong-password", &hash),
            Err(PasswordError::Mismatch)
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(hash_password("short"), Err(PasswordError::TooShort)));
    }

    #[test]
    fn test_invalid_hash_rejected() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(PasswordError::InvalidHash)
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("parola-sigura-123").expect("hash");
        let b = hash_password("parola-sigura-123").expect("hash");
        assert_ne!(a, b);
    }
}
