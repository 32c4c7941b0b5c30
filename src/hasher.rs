//! Argon2id password hashing.
//!
//! Every hash carries its own random salt in PHC string format, so the stored
//! value is self-describing and can be verified without extra columns.

use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::rngs::OsRng;

/// Hashes and verifies passwords with a fixed set of Argon2id parameters.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl PasswordHasher {
    #[must_use]
    pub const fn new(params: Params) -> Self {
        Self { params }
    }

    /// Cheap parameters for tests; never use in production.
    ///
    /// # Errors
    /// Returns an error if Argon2 rejects the parameter set.
    pub fn insecure_fast() -> Result<Self> {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None)
            .map_err(|err| anyhow!("invalid Argon2 parameters: {err}"))?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh salt.
    ///
    /// # Errors
    /// Returns an error if Argon2 fails to produce a hash.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?
            .to_string();
        Ok(hash)
    }

    /// Check a plaintext password against a stored PHC hash.
    ///
    /// Malformed hashes verify as `false`.
    #[must_use]
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
