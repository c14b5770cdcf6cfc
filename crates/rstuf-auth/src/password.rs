//! Password hashing
//!
//! Passwords are stored as Argon2id PHC strings. Verification reads the
//! parameters back from the stored string, so raising the cost only affects
//! newly hashed passwords.

use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier,
    SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::AuthError;

// Bounds the work an attacker can force per login attempt.
pub const MAX_PASSWORD_LENGTH: usize = 512;

/// Argon2id hasher
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    /// Hasher with the `argon2` crate's default (OWASP) cost
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Hasher with explicit memory (KiB) and iteration cost
    pub fn with_cost(m_cost_kib: u32, t_cost: u32) -> Result<Self, AuthError> {
        let params = Params::new(m_cost_kib, t_cost, 1, None)
            .map_err(|e| AuthError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(AuthError::InvalidPassword);
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))?;
        Ok(hash.to_string())
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable
    pub fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AuthError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Ok(false);
        }
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::Internal(format!("stored password hash is invalid: {e}")))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("failed to verify password: {e}"))),
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Hasher {
        Hasher::with_cost(8, 1).unwrap()
    }

    #[test]
    fn test_hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = cheap();
        assert_ne!(hasher.hash("pw").unwrap(), hasher.hash("pw").unwrap());
    }

    #[test]
    fn test_verify_uses_stored_parameters() {
        let hash = cheap().hash("pw").unwrap();
        let other = Hasher::with_cost(16, 2).unwrap();
        assert!(other.verify("pw", &hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(cheap().verify("pw", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_oversized_password() {
        let long = "a".repeat(MAX_PASSWORD_LENGTH + 1);
        assert!(cheap().hash(&long).is_err());
    }
}
